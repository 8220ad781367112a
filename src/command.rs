//! Operator command-line parsing.
//!
//! Every line the operator types is forwarded to the agent verbatim. The
//! `upload` and `download` verbs are additionally recognized here so the
//! console can validate their arguments and, for uploads, attach the file.
//!
//! Arguments split on whitespace; a double-quoted argument may contain
//! spaces. Backslashes are literal (remote paths are Windows paths).

use thiserror::Error;

/// Directory listing sent when the operator enters an empty line, and on the
/// bootstrap cycle before any directory is known.
pub const LIST_DIRECTORY: &str = "pwd | Format-Table -HideTableHeaders";

/// Fixed command asking the agent for its completion vocabulary.
pub const REQUEST_VOCABULARY: &str = "autocomplete";

pub const UPLOAD_USAGE: &str = "upload /src/path/file C:\\dest\\path\\file";
pub const DOWNLOAD_USAGE: &str = "download C:\\src\\path\\file /dst/path/file";

/// Verbs the console handles locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Upload,
    Download,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
        }
    }

    pub fn usage(self) -> &'static str {
        match self {
            Self::Upload => UPLOAD_USAGE,
            Self::Download => DOWNLOAD_USAGE,
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the console has to do with a command line besides forwarding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Send a local file as the response body.
    Upload { source: String, destination: String },
    /// Expect a `D0WNL04D` envelope carrying the remote file.
    Download { source: String, destination: String },
    /// Plain shell command, nothing to do locally.
    Shell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unmatched double quote")]
pub struct UnmatchedQuote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("{verb}: unmatched double quote")]
    UnmatchedQuote { verb: Verb },
    #[error("{verb}: expected exactly two paths")]
    ArgumentCount { verb: Verb },
}

impl UsageError {
    pub fn verb(self) -> Verb {
        match self {
            Self::UnmatchedQuote { verb } | Self::ArgumentCount { verb } => verb,
        }
    }

    /// Usage line for the verb that failed to parse.
    pub fn usage(self) -> &'static str {
        self.verb().usage()
    }
}

/// Classify a command line.
pub fn parse(line: &str) -> Result<Directive, UsageError> {
    let verb = match line.split_whitespace().next() {
        Some("upload") => Verb::Upload,
        Some("download") => Verb::Download,
        _ => return Ok(Directive::Shell),
    };

    let args = split_args(line).map_err(|UnmatchedQuote| UsageError::UnmatchedQuote { verb })?;
    let [_, source, destination] =
        <[String; 3]>::try_from(args).map_err(|_| UsageError::ArgumentCount { verb })?;

    Ok(match verb {
        Verb::Upload => Directive::Upload {
            source,
            destination,
        },
        Verb::Download => Directive::Download {
            source,
            destination,
        },
    })
}

/// Split on whitespace, grouping double-quoted runs. Quotes are removed.
pub fn split_args(line: &str) -> Result<Vec<String>, UnmatchedQuote> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;

    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if quoted {
        return Err(UnmatchedQuote);
    }
    if in_token {
        args.push(current);
    }
    Ok(args)
}
