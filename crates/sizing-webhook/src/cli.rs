use clap::builder::PossibleValue;
use clap::{
    Arg, ArgAction, Command, crate_authors, crate_description, crate_name, crate_version,
    value_parser,
};

pub fn build_cli() -> Command {
    let mut args = vec![
        Arg::new("log-level")
            .long("log-level")
            .value_name("LOG_LEVEL")
            .env("SIZING_WEBHOOK_LOG_LEVEL")
            .default_value("info")
            .value_parser([
                PossibleValue::new("trace"),
                PossibleValue::new("debug"),
                PossibleValue::new("info"),
                PossibleValue::new("warn"),
                PossibleValue::new("error"),
            ])
            .help("Log level"),
        Arg::new("log-fmt")
            .long("log-fmt")
            .value_name("LOG_FMT")
            .env("SIZING_WEBHOOK_LOG_FMT")
            .default_value("text")
            .value_parser([PossibleValue::new("text"), PossibleValue::new("json")])
            .help("Log output format"),
        Arg::new("log-no-color")
            .long("log-no-color")
            .env("NO_COLOR")
            .action(ArgAction::SetTrue)
            .help("Disable colored output for logs"),
        Arg::new("webhook-addr")
            .long("webhook-addr")
            .value_name("WEBHOOK_ADDRESS")
            .env("SIZING_WEBHOOK_ADDR")
            .default_value("0.0.0.0:8080")
            .help("Listen address of the admission webhook"),
        Arg::new("metrics-addr")
            .long("metrics-addr")
            .value_name("METRICS_ADDRESS")
            .env("SIZING_WEBHOOK_METRICS_ADDR")
            .default_value("0.0.0.0:8081")
            .help("Listen address of the metrics and health server"),
        Arg::new("metrics-path")
            .long("metrics-path")
            .value_name("METRICS_PATH")
            .env("SIZING_WEBHOOK_METRICS_PATH")
            .default_value("/metrics")
            .help("Route exposing the metrics"),
        Arg::new("cert-file")
            .long("cert-file")
            .value_name("CERT_FILE")
            .default_value("")
            .env("SIZING_WEBHOOK_CERT_FILE")
            .help("Path to an X.509 certificate file for HTTPS"),
        Arg::new("key-file")
            .long("key-file")
            .value_name("KEY_FILE")
            .default_value("")
            .env("SIZING_WEBHOOK_KEY_FILE")
            .help("Path to an X.509 private key file for HTTPS"),
        Arg::new("label-mark")
            .long("label-mark")
            .short('l')
            .value_name("KEY=VALUE")
            .env("SIZING_WEBHOOK_LABEL_MARKS")
            .action(ArgAction::Append)
            .value_delimiter(',')
            .help("Label stamped on every workload. Can be repeated"),
        Arg::new("enable-guaranteed-memory")
            .long("enable-guaranteed-memory")
            .short('m')
            .env("SIZING_WEBHOOK_ENABLE_GUARANTEED_MEMORY")
            .action(ArgAction::SetTrue)
            .help("Set memory requests equal to memory limits on every container"),
        Arg::new("request-timeout")
            .long("request-timeout")
            .value_name("SECONDS")
            .env("SIZING_WEBHOOK_REQUEST_TIMEOUT")
            .default_value("10")
            .value_parser(value_parser!(u64).range(1..))
            .help("Abort the handling of an admission request after the given time"),
    ];
    args.sort_by(|a, b| a.get_id().cmp(b.get_id()));

    Command::new(crate_name!())
        .author(crate_authors!())
        .version(crate_version!())
        .about(crate_description!())
        .args(args)
}
