use clap::Parser;
use url::Url;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Finance Copilot backend", long_about = None)]
pub struct Args {
    #[arg(long, default_value_t = String::from(""), help = "The log directory e.g. '/var/logs'. If this is not provided, only logs out to stdout.")]
    pub base_log_dir: String,

    #[arg(
        long,
        env = "DATABASE_URL",
        default_value_t = String::from("sqlite://finance.db"),
        help = "SQLite database URL that is compliant with sqlx SqlitePool e.g. 'sqlite://finance.db'"
    )]
    pub database_url: String,

    #[arg(long, default_value_t = 3000u32)]
    pub port: u32,

    #[arg(long, env = "JWT_SECRET", help = "Secret used to sign session tokens")]
    pub jwt_secret: String,

    #[arg(
        long,
        default_value_t = 24i64,
        value_parser = clap::value_parser!(i64).range(1..=8760),
        help = "Number of hours an issued session token stays valid"
    )]
    pub session_ttl_hours: i64,

    #[arg(
        long,
        default_value_t = argon2::Params::DEFAULT_M_COST,
        help = "Argon2 memory cost in KiB used when hashing passwords"
    )]
    pub hash_memory_kib: u32,

    #[arg(
        long,
        default_value_t = argon2::Params::DEFAULT_T_COST,
        help = "Argon2 iteration count used when hashing passwords"
    )]
    pub hash_iterations: u32,

    #[arg(
        long,
        default_value_t = argon2::Params::DEFAULT_P_COST,
        help = "Argon2 degree of parallelism used when hashing passwords"
    )]
    pub hash_parallelism: u32,

    #[arg(
        long,
        env = "OPENAI_API_KEY",
        help = "API key for the chat completion provider. Without it the chat endpoint serves canned tips."
    )]
    pub openai_api_key: Option<String>,

    #[arg(
        long,
        default_value = "https://api.openai.com/v1/",
        help = "Base URL of an OpenAI compatible API, with a trailing slash"
    )]
    pub openai_base_url: Url,

    #[arg(long, default_value_t = String::from("gpt-3.5-turbo"))]
    pub openai_model: String,

    #[arg(
        long,
        default_value_t = 30u64,
        help = "Seconds to wait for the completion provider before falling back"
    )]
    pub provider_timeout_secs: u64,

    #[arg(
        long = "cors-origin",
        default_values_t = [
            String::from("http://localhost:3000"),
            String::from("http://127.0.0.1:3000"),
            String::from("http://localhost:8080"),
            String::from("http://127.0.0.1:8080"),
        ],
        help = "Origin allowed to call the API. Repeat to allow several."
    )]
    pub cors_origins: Vec<String>,
}

pub fn parse_args() -> Args {
    return Args::parse();
}
