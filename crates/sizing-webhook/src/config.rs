use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::ArgMatches;
use lazy_static::lazy_static;

lazy_static! {
    pub(crate) static ref HOSTNAME: String =
        std::env::var("HOSTNAME").unwrap_or_else(|_| String::from("unknown"));
}

pub struct Config {
    pub webhook_addr: SocketAddr,
    pub metrics_addr: SocketAddr,
    pub metrics_path: String,
    pub tls_config: Option<TlsConfig>,
    pub label_marks: BTreeMap<String, String>,
    pub enable_guaranteed_memory: bool,
    pub request_timeout: Duration,
    pub log_level: String,
    pub log_fmt: String,
    pub log_no_color: bool,
}

#[derive(Clone, Debug)]
pub struct TlsConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

impl Config {
    pub fn from_args(matches: &ArgMatches) -> Result<Self> {
        let webhook_addr = bind_address(matches, "webhook-addr")?;
        let metrics_addr = bind_address(matches, "metrics-addr")?;
        let metrics_path = string_arg(matches, "metrics-path")?;
        if !metrics_path.starts_with('/') {
            return Err(anyhow!(
                "error parsing arguments: --metrics-path must start with '/', got {metrics_path:?}"
            ));
        }

        let tls_config = tls_config(matches)?;
        let label_marks = label_marks(matches)?;
        let enable_guaranteed_memory = matches.get_flag("enable-guaranteed-memory");
        let request_timeout = matches
            .get_one::<u64>("request-timeout")
            .map(|seconds| Duration::from_secs(*seconds))
            .ok_or_else(|| anyhow!("request-timeout should always be set"))?;

        let log_level = string_arg(matches, "log-level")?;
        let log_fmt = string_arg(matches, "log-fmt")?;
        let log_no_color = matches.get_flag("log-no-color");

        Ok(Self {
            webhook_addr,
            metrics_addr,
            metrics_path,
            tls_config,
            label_marks,
            enable_guaranteed_memory,
            request_timeout,
            log_level,
            log_fmt,
            log_no_color,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            webhook_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            metrics_path: String::from("/metrics"),
            tls_config: None,
            label_marks: BTreeMap::new(),
            enable_guaranteed_memory: false,
            request_timeout: Duration::from_secs(10),
            log_level: String::from("info"),
            log_fmt: String::from("text"),
            log_no_color: false,
        }
    }
}

fn string_arg(matches: &ArgMatches, id: &str) -> Result<String> {
    matches
        .get_one::<String>(id)
        .cloned()
        .ok_or_else(|| anyhow!("{id} should always be set, it has a default value"))
}

fn bind_address(matches: &ArgMatches, id: &str) -> Result<SocketAddr> {
    string_arg(matches, id)?
        .parse()
        .map_err(|e| anyhow!("error parsing arguments: invalid --{id}: {e}"))
}

fn tls_config(matches: &ArgMatches) -> Result<Option<TlsConfig>> {
    let cert_file = string_arg(matches, "cert-file")?;
    let key_file = string_arg(matches, "key-file")?;

    match (cert_file.is_empty(), key_file.is_empty()) {
        (true, true) => Ok(None),
        (false, false) => Ok(Some(TlsConfig {
            cert_file: PathBuf::from(cert_file),
            key_file: PathBuf::from(key_file),
        })),
        _ => Err(anyhow!(
            "error parsing arguments: either both --cert-file and --key-file must be provided, or neither"
        )),
    }
}

fn label_marks(matches: &ArgMatches) -> Result<BTreeMap<String, String>> {
    matches
        .get_many::<String>("label-mark")
        .into_iter()
        .flatten()
        .map(String::as_str)
        .map(parse_label_mark)
        .collect()
}

/// Parse a `key=value` label mark. The value may be empty, the key may not.
fn parse_label_mark(mark: &str) -> Result<(String, String)> {
    match mark.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(anyhow!(
            "error parsing arguments: label mark {mark:?} is not in the KEY=VALUE form"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli;
    use rstest::rstest;

    fn config_from(flags: &[&str]) -> Result<Config> {
        let mut args = vec!["sizing-webhook"];
        args.extend(flags);
        let matches = cli::build_cli().try_get_matches_from(args)?;
        Config::from_args(&matches)
    }

    #[test]
    fn defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.webhook_addr, SocketAddr::from(([0, 0, 0, 0], 8080)));
        assert_eq!(config.metrics_addr, SocketAddr::from(([0, 0, 0, 0], 8081)));
        assert_eq!(config.metrics_path, "/metrics");
        assert!(config.tls_config.is_none());
        assert!(config.label_marks.is_empty());
        assert!(!config.enable_guaranteed_memory);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_fmt, "text");
    }

    #[test]
    fn boolean_flags() {
        for provide_flag in [true, false] {
            let flags: &[&str] = if provide_flag {
                &["--enable-guaranteed-memory", "--log-no-color"]
            } else {
                &[]
            };

            let config = config_from(flags).unwrap();
            assert_eq!(provide_flag, config.enable_guaranteed_memory);
            if provide_flag {
                assert!(config.log_no_color);
            }
        }
    }

    #[test]
    fn short_flags() {
        let config = config_from(&["-m", "-l", "team=x"]).unwrap();

        assert!(config.enable_guaranteed_memory);
        assert_eq!(config.label_marks.get("team").map(String::as_str), Some("x"));
    }

    #[test]
    fn label_marks_are_collected() {
        let config = config_from(&[
            "--label-mark",
            "team=x",
            "--label-mark",
            "env=prod,tier=",
            "-l",
            "team=y",
        ])
        .unwrap();

        let expected: BTreeMap<String, String> = [("env", "prod"), ("team", "y"), ("tier", "")]
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        assert_eq!(config.label_marks, expected);
    }

    #[rstest]
    #[case::no_separator("team")]
    #[case::empty_key("=x")]
    fn malformed_label_mark(#[case] mark: &str) {
        assert!(config_from(&["--label-mark", mark]).is_err());
    }

    #[rstest]
    #[case::cert_only(&["--cert-file", "cert.pem"])]
    #[case::key_only(&["--key-file", "key.pem"])]
    fn tls_files_must_come_in_pairs(#[case] flags: &[&str]) {
        assert!(config_from(flags).is_err());
    }

    #[test]
    fn tls_files() {
        let config = config_from(&["--cert-file", "cert.pem", "--key-file", "key.pem"]).unwrap();

        let tls_config = config.tls_config.unwrap();
        assert_eq!(tls_config.cert_file, PathBuf::from("cert.pem"));
        assert_eq!(tls_config.key_file, PathBuf::from("key.pem"));
    }

    #[rstest]
    #[case::not_an_address(&["--webhook-addr", "localhost"])]
    #[case::bad_metrics_addr(&["--metrics-addr", "0.0.0.0"])]
    #[case::relative_metrics_path(&["--metrics-path", "metrics"])]
    #[case::zero_timeout(&["--request-timeout", "0"])]
    #[case::unknown_log_fmt(&["--log-fmt", "otlp"])]
    fn invalid_arguments(#[case] flags: &[&str]) {
        assert!(config_from(flags).is_err());
    }
}
