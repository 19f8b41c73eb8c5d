//! Common functionality.

use byte_unit::{Byte, UnitType};
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use sha1::{Digest, Sha1};

pub mod io;

/// Commonly used command line arguments.
#[derive(Parser, Debug)]
pub struct Args {
    /// Verbosity of the program
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            verbose: Verbosity::new(0, 0),
        }
    }
}

/// Helper to print the current memory resident set size via `tracing`.
pub fn trace_rss_now() {
    let rss = procfs::process::Process::myself()
        .and_then(|me| me.stat())
        .map(|stat| stat.rss * procfs::page_size());
    match rss {
        Ok(rss) => tracing::debug!(
            "RSS now: {}",
            Byte::from_u64(rss).get_appropriate_unit(UnitType::Binary)
        ),
        Err(e) => tracing::debug!("could not determine RSS: {}", e),
    }
}

/// Return the version of the `variant-store` crate and `x.y.z` in tests.
pub fn worker_version() -> &'static str {
    if cfg!(test) {
        "x.y.z"
    } else {
        env!("CARGO_PKG_VERSION")
    }
}

/// Compute the lower-case hex SHA-1 digest of `value`.
pub fn sha1_hex(value: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(value.as_bytes());
    let hash = hasher.finalize();
    base16ct::lower::encode_string(&hash)
}

/// Expand `@path` arguments into the non-empty lines of the file at `path`.
pub fn expand_path_args(paths: &[String]) -> Result<Vec<String>, anyhow::Error> {
    let mut result = Vec::new();
    for path in paths {
        if let Some(list_path) = path.strip_prefix('@') {
            let contents = std::fs::read_to_string(list_path)
                .map_err(|e| anyhow::anyhow!("could not read path list {}: {}", list_path, e))?;
            result.extend(
                contents
                    .lines()
                    .map(|line| line.trim())
                    .filter(|line| !line.is_empty())
                    .map(|line| line.to_string()),
            );
        } else {
            result.push(path.clone());
        }
    }
    Ok(result)
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;

    #[test]
    fn sha1_hex_of_known_value() {
        insta::assert_snapshot!(sha1_hex("abc"), @"a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn expand_path_args_reads_list_files() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let list_path = tmp_dir.join("inputs.txt");
        {
            let mut f = std::fs::File::create(&list_path)?;
            writeln!(f, "a.jsonl")?;
            writeln!(f)?;
            writeln!(f, "  b.jsonl.gz  ")?;
        }

        let args = vec![
            String::from("x.jsonl"),
            format!("@{}", list_path.to_string_lossy()),
        ];
        let expanded = expand_path_args(&args)?;

        assert_eq!(expanded, vec!["x.jsonl", "a.jsonl", "b.jsonl.gz"]);

        Ok(())
    }
}
