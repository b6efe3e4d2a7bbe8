//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use crate::concat::SplitRule;
use crate::format::Format;
use crate::proxy::ProxyScheme;

/// Bulk caption and transcript downloader.
///
/// Fetches caption tracks for one video or a whole id list, writes them as
/// JSON, SRT, WebVTT, or plain text, and can combine everything into a single
/// file afterwards.
#[derive(Parser, Debug)]
#[command(name = "yt-bulk-cc")]
#[command(author, version, about)]
pub struct Args {
    /// Video link or bare 11-character video id
    pub link: Option<String>,

    /// File with one video per line: `<id>\t<title>` (title optional)
    #[arg(long, value_name = "FILE")]
    pub id_file: Option<PathBuf>,

    /// Output directory
    #[arg(short = 'o', long = "folder", default_value = ".")]
    pub folder: PathBuf,

    /// Caption language preference, repeatable in priority order
    #[arg(short = 'l', long = "language", value_name = "CODE")]
    pub languages: Vec<String>,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value_t = Format::Json)]
    pub format: Format,

    /// Prefix each text line with its start timestamp
    #[arg(short = 't', long)]
    pub timestamps: bool,

    /// Stop after this many videos
    #[arg(short = 'n', long, value_name = "N")]
    pub limit: Option<usize>,

    /// Concurrent downloads (1-32)
    #[arg(short = 'j', long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub jobs: u8,

    /// Politeness delay after each successful download, in seconds
    #[arg(short = 's', long, default_value_t = 2.0)]
    pub sleep: f64,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Drop the five-digit sequence prefix from filenames
    #[arg(long)]
    pub no_seq_prefix: bool,

    /// Skip stats headers and embedded stats objects
    #[arg(long)]
    pub no_stats: bool,

    /// Proxy endpoints, comma separated
    #[arg(short = 'p', long = "proxy", value_name = "URL", value_delimiter = ',')]
    pub proxy: Vec<String>,

    /// File with one proxy endpoint per line
    #[arg(long, value_name = "FILE")]
    pub proxy_file: Option<PathBuf>,

    /// Fetch this many public proxies before the run
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub public_proxy: usize,

    /// Country filter for public proxies (ISO code)
    #[arg(long, value_name = "CC")]
    pub public_proxy_country: Option<String>,

    /// Protocol requested from the public proxy list
    #[arg(long, value_enum, default_value_t = ProxyScheme::Http)]
    pub public_proxy_type: ProxyScheme,

    /// Probe every egress candidate before downloading anything
    #[arg(long)]
    pub check_ip: bool,

    /// Browser-exported cookie file (JSON array)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub cookie_json: Option<PathBuf>,

    /// Rewrite outputs that already exist
    #[arg(long)]
    pub overwrite: bool,

    /// Concatenate all outputs into one file with this basename
    #[arg(short = 'C', long, value_name = "BASENAME", num_args = 0..=1, default_missing_value = "combined")]
    pub concat: Option<String>,

    /// Cap combined files at N words/lines/chars, e.g. 12000c
    #[arg(long, value_name = "N[wlc]", requires = "concat")]
    pub split: Option<SplitRule>,

    /// Entries shown in the end-of-run file statistics block
    #[arg(long, value_name = "N", default_value_t = 10)]
    pub stats_top: usize,

    /// Convert existing JSON outputs instead of downloading
    #[arg(long, value_name = "FILE_OR_DIR")]
    pub convert: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(short = 'L', long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Disable the log file even if one is configured
    #[arg(long)]
    pub no_log: bool,
}

impl Args {
    /// Whether documents should carry stats headers / stats objects.
    #[must_use]
    pub fn include_stats(&self) -> bool {
        !self.no_stats
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::concat::SplitUnit;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["yt-bulk-cc", "dQw4w9WgXcQ"]).unwrap();
        assert_eq!(args.link.as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(args.jobs, 2);
        assert!((args.sleep - 2.0).abs() < f64::EPSILON);
        assert_eq!(args.format, Format::Json);
        assert_eq!(args.stats_top, 10);
        assert!(args.include_stats());
        assert!(args.concat.is_none());
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["yt-bulk-cc", "-vv", "x"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_language_repeats_in_order() {
        let args = Args::try_parse_from(["yt-bulk-cc", "-l", "en", "-l", "de", "x"]).unwrap();
        assert_eq!(args.languages, vec!["en", "de"]);
    }

    #[test]
    fn test_cli_proxy_list_splits_on_commas() {
        let args =
            Args::try_parse_from(["yt-bulk-cc", "-p", "http://a:1,http://b:2", "x"]).unwrap();
        assert_eq!(args.proxy, vec!["http://a:1", "http://b:2"]);
    }

    #[test]
    fn test_cli_concat_defaults_basename() {
        let args = Args::try_parse_from(["yt-bulk-cc", "x", "--concat"]).unwrap();
        assert_eq!(args.concat.as_deref(), Some("combined"));

        let args = Args::try_parse_from(["yt-bulk-cc", "x", "--concat", "all"]).unwrap();
        assert_eq!(args.concat.as_deref(), Some("all"));
    }

    #[test]
    fn test_cli_split_requires_concat() {
        let err = Args::try_parse_from(["yt-bulk-cc", "x", "--split", "100w"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);

        let args =
            Args::try_parse_from(["yt-bulk-cc", "x", "--concat", "--split", "100w"]).unwrap();
        let rule = args.split.unwrap();
        assert_eq!(rule.limit, 100);
        assert_eq!(rule.unit, SplitUnit::Words);
    }

    #[test]
    fn test_cli_rejects_malformed_split() {
        let err =
            Args::try_parse_from(["yt-bulk-cc", "x", "--concat", "--split", "12kb"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_jobs_range_enforced() {
        assert!(Args::try_parse_from(["yt-bulk-cc", "x", "-j", "0"]).is_err());
        assert!(Args::try_parse_from(["yt-bulk-cc", "x", "-j", "33"]).is_err());
        let args = Args::try_parse_from(["yt-bulk-cc", "x", "-j", "8"]).unwrap();
        assert_eq!(args.jobs, 8);
    }

    #[test]
    fn test_cli_format_values() {
        for (value, format) in [
            ("json", Format::Json),
            ("srt", Format::Srt),
            ("webvtt", Format::Webvtt),
            ("text", Format::Text),
            ("pretty", Format::Pretty),
        ] {
            let args = Args::try_parse_from(["yt-bulk-cc", "x", "-f", value]).unwrap();
            assert_eq!(args.format, format);
        }
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["yt-bulk-cc", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
