use clap::{ArgGroup, Parser};

#[derive(Parser, Debug, Clone)]
#[command(name = "saslink", about = "SAS platform client CLI", version)]
#[command(group(ArgGroup::new("mode").args(["login", "logout", "check_session", "list_contexts", "exec"]).multiple(false)))]
#[command(group(ArgGroup::new("debug_switch").args(["debug", "no_debug"]).multiple(false)))]
pub struct Cli {
    /// Program to submit, relative to the configured app location.
    #[arg(value_name = "PROGRAM")]
    pub program: Option<String>,

    /// JSON file holding input tables keyed by table name.
    #[arg(long)]
    pub data: Option<String>,

    /// Extra request parameter as KEY=VALUE.
    /// Can be used multiple times: --param a=1 --param b=2
    #[arg(long = "param", action = clap::ArgAction::Append)]
    pub param: Vec<String>,

    /// Print the server log of the request to stderr afterwards.
    #[arg(long = "show-log")]
    pub show_log: bool,

    /// Sign in to the server.
    #[arg(long)]
    pub login: bool,

    /// Sign out from the server.
    #[arg(long)]
    pub logout: bool,

    /// Report whether the server session is still signed in.
    #[arg(long = "check-session")]
    pub check_session: bool,

    /// List the compute contexts the caller can execute on (Viya only).
    #[arg(long = "list-contexts")]
    pub list_contexts: bool,

    /// Execute the code in FILE on the server.
    #[arg(long, value_name = "FILE")]
    pub exec: Option<String>,

    /// Username for --login, or for the sign-in a request may demand.
    #[arg(long)]
    pub user: Option<String>,

    /// Compute context for --exec on Viya.
    #[arg(long, default_value = "SAS Job Execution compute context")]
    pub context: String,

    /// Server name for --exec on SAS 9.
    #[arg(long = "server-name", default_value = "SASApp")]
    pub server_name: String,

    /// Metadata repository for --exec on SAS 9.
    #[arg(long, default_value = "Foundation")]
    pub repository: String,

    /// Bearer token for the Viya APIs.
    #[arg(long = "access-token")]
    pub access_token: Option<String>,

    /// Server URL, overriding the configured one.
    #[arg(long = "server-url")]
    pub server_url: Option<String>,

    /// Server type, SAS9 or SASVIYA, overriding the configured one.
    #[arg(long = "server-type")]
    pub server_type: Option<String>,

    /// App location, overriding the configured one.
    #[arg(long = "app-loc")]
    pub app_loc: Option<String>,

    /// Ask the server for full logs alongside results.
    #[arg(long)]
    pub debug: bool,
    /// Ask the server for results only.
    #[arg(long = "no-debug")]
    pub no_debug: bool,

    /// Verbose client-side logging.
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
