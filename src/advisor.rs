//! Chat advice from the completion provider, with a fixed tip table as fallback.

use std::{sync::Arc, time::Duration};

use serde::Serialize;

use crate::{
    domain::Transaction,
    error::AppError,
    model::Ledger,
    openai::{CompletionProvider, CompletionRequest, ProviderError},
};

pub const CONTEXT_TRANSACTION_LIMIT: i64 = 20;
pub const MAX_COMPLETION_TOKENS: u32 = 300;
pub const COMPLETION_TEMPERATURE: f32 = 0.7;

pub const FALLBACK_NOTE: &str =
    "\n\n(Note: AI service temporarily unavailable - showing helpful financial tip instead)";

const NO_TRANSACTIONS: &str = "No recent transactions available.";

/// Checked top to bottom; the first rule with a keyword contained in the
/// lower-cased question wins.
const FALLBACK_RULES: &[(&[&str], &str)] = &[
    (
        &["budget"],
        "For budgeting, I recommend the 50/30/20 rule: 50% for needs, 30% for wants, and 20% for savings. Track your expenses regularly to stay on top of your financial goals!",
    ),
    (
        &["save", "saving"],
        "Start saving by setting up automatic transfers to a separate savings account. Even $25-50 per week adds up quickly! Emergency funds should cover 3-6 months of expenses.",
    ),
    (
        &["debt"],
        "For debt management, consider the debt snowball method (pay minimums on all debts, then focus extra payments on the smallest balance) or avalanche method (focus on highest interest rates first).",
    ),
    (
        &["invest"],
        "Before investing, ensure you have an emergency fund. Consider low-cost index funds for long-term growth. Start small and increase gradually as you learn more about investing.",
    ),
];

const GENERIC_TIP: &str = "I'm here to help with your finances! Try asking about budgeting, saving strategies, debt management, or spending analysis. I can provide personalized advice based on your transaction history.";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AdviceSource {
    Provider,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Advice {
    pub text: String,
    pub source: AdviceSource,
}

pub fn fallback_tip(question: &str) -> &'static str {
    let question = question.to_lowercase();
    FALLBACK_RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|keyword| question.contains(keyword)))
        .map(|(_, tip)| *tip)
        .unwrap_or(GENERIC_TIP)
}

pub fn render_context(transactions: &[Transaction]) -> String {
    if transactions.is_empty() {
        return NO_TRANSACTIONS.to_string();
    }

    let rendered: Vec<_> = transactions
        .iter()
        .map(|t| {
            format!(
                "{} of ${} for {} ({}) on {}",
                t.kind, t.amount, t.description, t.category, t.date
            )
        })
        .collect();

    format!("Recent transactions: {}", rendered.join(", "))
}

fn system_prompt(context: &str) -> String {
    format!(
        "You are Finance Copilot, a helpful AI financial advisor. \
You provide personalized financial advice based on user data. Keep responses concise but helpful and encouraging.

User's financial context: {}

Provide practical, actionable advice. If the user asks about budgeting, spending patterns, \
savings, investments, or financial planning, use their transaction data to give personalized suggestions. \
Be encouraging and supportive while being realistic about financial goals.",
        context
    )
}

pub struct Advisor {
    ledger: Ledger,
    provider: Arc<dyn CompletionProvider>,
    timeout: Duration,
}

impl Advisor {
    pub fn new(ledger: Ledger, provider: Arc<dyn CompletionProvider>, timeout: Duration) -> Self {
        Self {
            ledger,
            provider,
            timeout,
        }
    }

    pub async fn advise(&self, user_id: i64, question: &str) -> Result<Advice, AppError> {
        if question.trim().is_empty() {
            return Err(AppError::validation("Message is required"));
        }

        let recent = self
            .ledger
            .recent(user_id, CONTEXT_TRANSACTION_LIMIT)
            .await
            .inspect_err(|err| {
                tracing::error!("Error fetching transaction context in advise: {:#?}", err)
            })?;

        let request = CompletionRequest {
            system: system_prompt(&render_context(&recent)),
            user: question.to_string(),
            max_tokens: MAX_COMPLETION_TOKENS,
            temperature: COMPLETION_TEMPERATURE,
        };

        match self.ask_provider(request).await {
            Ok(text) => {
                tracing::info!("Provider answered chat message for user_id={}", user_id);
                Ok(Advice {
                    text,
                    source: AdviceSource::Provider,
                })
            }
            Err(err) => {
                tracing::warn!(
                    "Completion provider unavailable for user_id={}, using fallback: {}",
                    user_id,
                    err
                );
                Ok(Advice {
                    text: format!("{}{}", fallback_tip(question), FALLBACK_NOTE),
                    source: AdviceSource::Fallback,
                })
            }
        }
    }

    async fn ask_provider(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        tokio::time::timeout(self.timeout, self.provider.complete(request))
            .await
            .map_err(|_| ProviderError::Timeout)?
    }
}


#[cfg(test)]
mod tests {
    use super::{testing::StubProvider, *};
    use crate::{
        credentials::{CredentialStore, test_params},
        db::test_pool,
        model::TransactionInput,
    };

    async fn advisor_with(provider: Arc<StubProvider>) -> (Advisor, Ledger, i64) {
        let pool = test_pool().await;
        let user = CredentialStore::new(pool.clone(), test_params())
            .unwrap()
            .register("alice", "alice@x.com", "secret1")
            .await
            .unwrap();
        let ledger = Ledger::new(pool);
        let advisor = Advisor::new(ledger.clone(), provider, Duration::from_secs(5));
        (advisor, ledger, user.id)
    }

    #[test]
    fn fallback_rules_follow_priority() {
        assert!(fallback_tip("How do I BUDGET?").contains("50/30/20"));
        assert!(fallback_tip("budget to save for a house").contains("50/30/20"));
        assert!(fallback_tip("Saving tips").contains("automatic transfers"));
        assert!(fallback_tip("I want to save").contains("automatic transfers"));
        assert!(fallback_tip("pay off debt or save?").contains("automatic transfers"));
        assert!(fallback_tip("credit card debt").contains("snowball"));
        assert!(fallback_tip("Should I invest?").contains("index funds"));
        assert_eq!(fallback_tip("hello"), GENERIC_TIP);
    }

    #[test]
    fn context_for_empty_ledger() {
        assert_eq!(render_context(&[]), NO_TRANSACTIONS);
    }

    #[tokio::test]
    async fn empty_question_is_rejected() {
        let (advisor, _, user_id) = advisor_with(Arc::new(StubProvider::replying("hi"))).await;

        for question in ["", "   \n"] {
            let result = advisor.advise(user_id, question).await;
            assert!(matches!(result, Err(AppError::Validation(_))));
        }
    }

    #[tokio::test]
    async fn provider_reply_is_returned_verbatim_with_context() {
        let provider = Arc::new(StubProvider::replying("Spend less on food."));
        let (advisor, ledger, user_id) = advisor_with(provider.clone()).await;
        ledger
            .insert(
                user_id,
                TransactionInput {
                    description: Some("Groceries".to_string()),
                    amount: Some(40.0),
                    kind: Some("expense".to_string()),
                    category: Some("food".to_string()),
                    date: Some("2024-01-02".to_string()),
                },
            )
            .await
            .unwrap();

        let advice = advisor.advise(user_id, "Where does my money go?").await.unwrap();

        assert_eq!(
            advice,
            Advice {
                text: "Spend less on food.".to_string(),
                source: AdviceSource::Provider,
            }
        );

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].user, "Where does my money go?");
        assert_eq!(requests[0].max_tokens, MAX_COMPLETION_TOKENS);
        assert!(requests[0]
            .system
            .contains("expense of $40 for Groceries (food) on 2024-01-02"));
    }

    #[tokio::test]
    async fn provider_failure_falls_back() {
        let (advisor, _, user_id) = advisor_with(Arc::new(StubProvider::failing())).await;

        let advice = advisor.advise(user_id, "how do I budget?").await.unwrap();

        assert_eq!(advice.source, AdviceSource::Fallback);
        assert!(advice.text.contains("50/30/20"));
        assert!(advice.text.ends_with(FALLBACK_NOTE));
    }

    #[tokio::test]
    async fn slow_provider_falls_back() {
        let provider = Arc::new(StubProvider {
            delay: Some(Duration::from_secs(60)),
            ..StubProvider::replying("too late")
        });
        let (mut advisor, _, user_id) = advisor_with(provider).await;
        advisor.timeout = Duration::from_millis(50);

        let advice = advisor.advise(user_id, "any debt advice?").await.unwrap();

        assert_eq!(advice.source, AdviceSource::Fallback);
        assert!(advice.text.contains("snowball"));
    }

    #[tokio::test]
    async fn context_is_limited_to_recent_transactions() {
        let provider = Arc::new(StubProvider::replying("ok"));
        let (advisor, ledger, user_id) = advisor_with(provider.clone()).await;
        for i in 1..=25 {
            ledger
                .insert(
                    user_id,
                    TransactionInput {
                        description: Some(format!("item{}", i)),
                        amount: Some(i as f64),
                        kind: Some("expense".to_string()),
                        category: Some("misc".to_string()),
                        date: Some("2024-01-01".to_string()),
                    },
                )
                .await
                .unwrap();
        }

        advisor.advise(user_id, "summary please").await.unwrap();

        let system = provider.requests.lock().unwrap()[0].system.clone();
        assert_eq!(system.matches(" (misc) on ").count(), 20);
        assert!(system.contains("for item25 (misc)"));
        assert!(!system.contains("for item5 (misc)"));
    }
}
