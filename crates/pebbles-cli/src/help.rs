//! Help block parsing for registered commands.
//!
//! Every handler is registered together with a comment-style help literal:
//!
//! ```text
//! # apps:info
//! #
//! # show detailed app information
//! #
//! # -s, --shell  # output more shell friendly key/value pairs
//! ```
//!
//! The first line is the banner, the third description line is the summary, and
//! indented lines of the form `-x, --long VALUE  # text` declare options.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

const COMMENT_MARKER: char = '#';

/// Indented dash, flag spellings, then a `#` delimited description.
const OPTION_LINE_PATTERN: &str = r"^\s+(-.+?)\s*#(.+)";

static OPTION_LINE: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(OPTION_LINE_PATTERN));

/// A declared command-line option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OptionDescriptor {
    /// Longest spelling without leading dashes, e.g. `verbose`.
    pub(crate) name: String,
    /// Flag spellings without value placeholders, e.g. `["-v", "--verbose"]`.
    pub(crate) flags: Vec<String>,
    /// Whether any spelling declared a value placeholder (`--remote REMOTE`).
    pub(crate) takes_value: bool,
}

impl OptionDescriptor {
    pub(crate) fn matches(&self, spelling: &str) -> bool {
        self.flags.iter().any(|flag| flag == spelling)
    }
}

/// Help lines extracted from a help block, marker stripped, in original order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct HelpText {
    lines: Vec<String>,
}

impl HelpText {
    /// Scan a block from its last line upward, collecting comment lines until the
    /// first line that is neither blank nor a comment.
    ///
    /// Blank source lines before the first comment line are dropped; a leading
    /// bare `#` is kept as an empty first line, leaving the banner unset.
    pub(crate) fn extract(block: &str) -> Self {
        let mut buffer = Vec::new();
        for raw in block.lines().rev() {
            let line = raw.trim();
            if line.is_empty() {
                buffer.push((false, String::new()));
            } else if let Some(stripped) = line.strip_prefix(COMMENT_MARKER) {
                buffer.push((true, stripped.to_string()));
            } else {
                break;
            }
        }
        buffer.reverse();

        let start = buffer
            .iter()
            .position(|(comment, _)| *comment)
            .unwrap_or(buffer.len());
        let end = buffer
            .iter()
            .rposition(|(_, line)| !line.is_empty())
            .map_or(start, |index| index + 1)
            .max(start);
        Self {
            lines: buffer.drain(start..end).map(|(_, line)| line).collect(),
        }
    }

    /// Raw help text, one line per help line.
    pub(crate) fn raw(&self) -> String {
        self.lines.join("\n")
    }

    pub(crate) fn banner(&self) -> Option<String> {
        self.lines
            .first()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
    }

    pub(crate) fn description_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .map(String::as_str)
            .filter(|line| !is_option_line(line))
            .collect()
    }

    pub(crate) fn description(&self) -> String {
        self.description_lines().join("\n")
    }

    pub(crate) fn summary(&self) -> String {
        self.description_lines()
            .get(2)
            .map(|line| line.trim().to_string())
            .unwrap_or_default()
    }

    pub(crate) fn options(&self) -> Vec<OptionDescriptor> {
        self.lines
            .iter()
            .filter(|line| is_option_line(line))
            .filter_map(|line| parse_option_line(line))
            .collect()
    }
}

fn option_captures(line: &str) -> Option<Captures<'_>> {
    match OPTION_LINE.as_ref() {
        Ok(pattern) => pattern.captures(line),
        Err(err) => {
            tracing::warn!(error = %err, "option line pattern failed to compile");
            None
        }
    }
}

fn is_option_line(line: &str) -> bool {
    option_captures(line).is_some()
}

fn parse_option_line(line: &str) -> Option<OptionDescriptor> {
    let captures = option_captures(line)?;
    let mut args: Vec<&str> = captures
        .get(1)?
        .as_str()
        .split(',')
        .map(str::trim)
        .filter(|arg| !arg.is_empty())
        .collect();
    args.sort_unstable_by(|a, b| b.cmp(a));

    let longest = args.last()?;
    let name = longest
        .split_whitespace()
        .next()?
        .trim_start_matches('-')
        .to_string();
    if name.is_empty() {
        return None;
    }

    let takes_value = args.iter().any(|arg| arg.split_whitespace().count() > 1);
    let flags = args
        .iter()
        .filter_map(|arg| arg.split_whitespace().next())
        .map(str::to_string)
        .collect();

    Some(OptionDescriptor {
        name,
        flags,
        takes_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    impl HelpText {
        fn lines(&self) -> &[String] {
            &self.lines
        }

        fn is_empty(&self) -> bool {
            self.lines.is_empty()
        }
    }

    const WIDGETS_LIST: &str = "\
# widgets:list

# list widgets

# -v, --verbose  # show extra detail
";

    #[test]
    fn extracts_banner_summary_and_single_option() {
        let help = HelpText::extract(WIDGETS_LIST);
        assert_eq!(help.banner().as_deref(), Some("widgets:list"));
        assert_eq!(help.summary(), "list widgets");

        let options = help.options();
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].name, "verbose");
        assert!(options[0].matches("-v"));
        assert!(options[0].matches("--verbose"));
        assert!(!options[0].takes_value);
    }

    #[test]
    fn description_excludes_option_lines() {
        let help = HelpText::extract(WIDGETS_LIST);
        assert!(!help.description().contains("--verbose"));
        assert!(help.raw().contains("--verbose"));
    }

    #[test]
    fn scanning_stops_at_first_non_comment_line() {
        let block = "\
fn unrelated() {}
# config:get KEY
#
# display a config value for an app
";
        let help = HelpText::extract(block);
        assert_eq!(help.banner().as_deref(), Some("config:get KEY"));
        assert_eq!(help.lines().len(), 3);
        assert_eq!(help.summary(), "display a config value for an app");
    }

    #[test]
    fn value_placeholders_mark_options_as_taking_values() {
        let block = "\
# apps:create [NAME]
#
# create a new app
#
#     --addons ADDONS        # a comma-delimited list of addons to install
# -b, --buildpack BUILDPACK  # a buildpack url to use for this app
# -n, --no-remote            # don't create a git remote
";
        let options = HelpText::extract(block).options();
        let names: Vec<&str> = options.iter().map(|option| option.name.as_str()).collect();
        assert_eq!(names, ["addons", "buildpack", "no-remote"]);
        assert!(options[0].takes_value);
        assert_eq!(options[1].flags, ["-b", "--buildpack"]);
        assert!(options[1].takes_value);
        assert!(!options[2].takes_value);
    }

    #[test]
    fn unindented_dash_lines_are_description() {
        let block = "\
# apps
#
#- not an option # really
";
        let help = HelpText::extract(block);
        assert!(help.options().is_empty());
        assert_eq!(help.summary(), "- not an option # really");
    }

    #[test]
    fn spellings_may_contain_the_comment_marker() {
        let help = HelpText::extract("# cmd\n#\n# summary\n#\n# -#x, --hash-x  # weird\n");
        let options = help.options();
        assert_eq!(options.len(), 1);
        assert!(options[0].matches("--hash-x"));
        assert!(options[0].matches("-#x"));
        assert_eq!(help.description(), " cmd\n\n summary\n");
    }

    #[test]
    fn description_may_contain_the_comment_marker() {
        let help = HelpText::extract("# cmd\n#\n# summary\n#\n# -t, --tag TAG  # use #tags\n");
        let options = help.options();
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].name, "tag");
        assert_eq!(options[0].flags, ["-t", "--tag"]);
        assert!(options[0].takes_value);
    }

    #[test]
    fn option_line_pattern_compiles() {
        assert!(OPTION_LINE.is_ok());
    }

    #[test]
    fn leading_bare_comment_leaves_banner_unset() {
        let help = HelpText::extract("\n#\n# second line\n#\n# summary\n");
        assert!(help.banner().is_none());
        assert_eq!(help.lines().len(), 4);
        assert_eq!(help.summary(), "");
        assert_eq!(help.description_lines()[1], " second line");
    }

    #[test]
    fn empty_block_yields_no_banner() {
        let help = HelpText::extract("\n\n");
        assert!(help.is_empty());
        assert!(help.banner().is_none());
        assert_eq!(help.summary(), "");
    }
}
