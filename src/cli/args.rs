use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "routebuster",
    version,
    about = "API route compiler and proxy tunnel toolkit",
    long_about = "Routebuster compiles candidate API routes from wordlists, hosted wordlists, precompiled route files and OpenAPI/Swagger documents, and dials targets through rotating upstream proxies.\n\nExamples:\n  routebuster -w ./api-words.txt -e json,xml\n  routebuster -k https://petstore.swagger.io/v2/swagger.json --of json\n  routebuster -A apiroutes;20000 --wd ~/.routebuster/wordlists\n  routebuster -k ./openapi.yaml --compile-out ./routes.kite\n  routebuster --probe example.com:443 --tls -p 127.0.0.1:8080\n\nTip: Use --config to persist sources and proxies and keep CLI invocations short."
)]
pub struct CliArgs {
    #[arg(
        short = 'v',
        long = "vb",
        visible_alias = "verbose",
        action = ArgAction::Count,
        help_heading = "Output",
        help = "Increase verbosity (-v, -vv)."
    )]
    pub verbose: u8,

    #[arg(
        short = 'c',
        long = "clr",
        visible_alias = "color",
        help_heading = "Output",
        help = "Enable colored output (overrides --no-color)."
    )]
    pub color: bool,

    #[arg(
        short = 'n',
        long = "nc",
        visible_alias = "no-color",
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,

    #[arg(
        short = 'o',
        long = "out",
        visible_alias = "output",
        value_name = "FILE",
        help_heading = "Output",
        help = "Write the route listing to a file instead of stdout."
    )]
    pub output: Option<String>,

    #[arg(
        long = "of",
        visible_alias = "output-format",
        value_name = "FORMAT",
        help_heading = "Output",
        help = "Route listing format: text or json (inferred from --output when omitted)."
    )]
    pub output_format: Option<String>,

    #[arg(
        long = "co",
        visible_alias = "compile-out",
        value_name = "FILE",
        help_heading = "Output",
        help = "Also write the parsed API records as a precompiled route file."
    )]
    pub compile_out: Option<String>,

    #[arg(
        short = 'C',
        long = "cfg",
        visible_alias = "config",
        value_name = "FILE",
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.routebuster/config.yml)."
    )]
    pub config: Option<String>,

    #[arg(
        long = "init-config",
        help_heading = "Input",
        help = "Write a commented default config file if none exists, then exit."
    )]
    pub init_config: bool,

    #[arg(
        short = 'w',
        long = "wl",
        visible_alias = "wordlist",
        value_name = "FILE",
        action = ArgAction::Append,
        help_heading = "Sources",
        help = "Plain text wordlist, one path per line (repeatable)."
    )]
    pub wordlist: Vec<String>,

    #[arg(
        short = 'A',
        long = "hw",
        visible_alias = "hosted-wordlist",
        value_name = "NAME[;MAXLEN]",
        action = ArgAction::Append,
        help_heading = "Sources",
        help = "Hosted wordlist from --wordlist-dir, optionally bounded to its first MAXLEN words (repeatable)."
    )]
    pub hosted_wordlist: Vec<String>,

    #[arg(
        long = "hapi",
        visible_alias = "hosted-api-wordlist",
        value_name = "NAME[;MAXLEN]",
        action = ArgAction::Append,
        help_heading = "Sources",
        help = "Hosted route file from --wordlist-dir, optionally bounded to its first MAXLEN APIs (repeatable)."
    )]
    pub hosted_api_wordlist: Vec<String>,

    #[arg(
        short = 'k',
        long = "spec",
        visible_alias = "kitebuilder-list",
        value_name = "FILE|URL",
        action = ArgAction::Append,
        help_heading = "Sources",
        help = "OpenAPI/Swagger document (JSON or YAML, file or URL) or precompiled route file (repeatable)."
    )]
    pub spec: Vec<String>,

    #[arg(
        long = "wd",
        visible_alias = "wordlist-dir",
        value_name = "DIR",
        help_heading = "Sources",
        help = "Directory holding hosted wordlists (defaults to ~/.routebuster/wordlists)."
    )]
    pub wordlist_dir: Option<String>,

    #[arg(
        short = 'e',
        long = "extensions",
        visible_alias = "ext",
        value_name = "EXTS",
        help_heading = "Routes",
        help = "Extensions to permute wordlist entries with (comma-separated, e.g. php,json)."
    )]
    pub extensions: Option<String>,

    #[arg(
        short = 'D',
        long = "dirsearch",
        visible_alias = "dirsearch-compat",
        help_heading = "Routes",
        help = "Replace %EXT% in wordlist entries instead of appending extensions."
    )]
    pub dirsearch_compat: bool,

    #[arg(
        short = 'X',
        long = "fm",
        visible_alias = "force-method",
        value_name = "METHOD",
        help_heading = "Routes",
        help = "Override the method of every compiled route."
    )]
    pub force_method: Option<String>,

    #[arg(
        long = "fa",
        visible_alias = "filter-api",
        value_name = "NAMES",
        help_heading = "Routes",
        help = "Only keep routes from these APIs or wordlists (comma-separated)."
    )]
    pub filter_apis: Option<String>,

    #[arg(
        long = "to",
        visible_alias = "timeout",
        value_name = "SECONDS",
        help_heading = "Network",
        help = "Fetch and dial timeout in seconds."
    )]
    pub timeout: Option<usize>,

    #[arg(
        long = "insecure",
        help_heading = "Network",
        help = "Accept invalid TLS certificates when fetching specs by URL."
    )]
    pub insecure: bool,

    #[arg(
        short = 'p',
        long = "px",
        visible_alias = "proxy",
        value_name = "HOST:PORT",
        action = ArgAction::Append,
        help_heading = "Network",
        help = "Upstream proxy used round-robin for dials (repeatable)."
    )]
    pub proxy: Vec<String>,

    #[arg(
        long = "pf",
        visible_alias = "proxy-file",
        value_name = "FILE",
        help_heading = "Network",
        help = "Load upstream proxies from a file (one per line)."
    )]
    pub proxy_file: Option<String>,

    #[arg(
        long = "probe",
        value_name = "HOST:PORT",
        help_heading = "Network",
        help = "Dial an address through the proxy pool (or directly) and report the result."
    )]
    pub probe: Option<String>,

    #[arg(
        long = "tls",
        help_heading = "Network",
        help = "Open a CONNECT tunnel for --probe instead of a plain proxy connection."
    )]
    pub tls: bool,

    #[arg(
        long = "rp",
        visible_alias = "replay",
        value_name = "URL",
        help_heading = "Replay",
        help = "Mirror every compiled route against this target through --replay-proxy."
    )]
    pub replay: Option<String>,

    #[arg(
        long = "rpx",
        visible_alias = "replay-proxy",
        value_name = "URL",
        help_heading = "Replay",
        help = "Inspection proxy that receives replayed requests (e.g. http://127.0.0.1:8080)."
    )]
    pub replay_proxy: Option<String>,

    #[arg(
        short = 'H',
        long = "hdr",
        visible_alias = "header",
        value_name = "HEADER",
        action = ArgAction::Append,
        help_heading = "Replay",
        help = "Target header in 'Key: Value' format sent with replayed requests (repeatable)."
    )]
    pub header: Vec<String>,
}
