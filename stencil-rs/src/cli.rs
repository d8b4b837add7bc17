//! Command-line argument parsing.
//!
//! Usage:
//!   stencil [-c<config>] [-n] [-D<name>=<value>]… [-i] [-s] <template|->

use std::path::PathBuf;

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Config-file specification.
    pub config: ConfigFile,
    /// Values bound on the self object (`-D<name>=<value>`), in order.
    pub defines: Vec<(String, String)>,
    /// Swallow directive failures (`-i`).
    pub ignore_errors: bool,
    /// Unknown identifiers are errors (`-s`).
    pub strict: bool,
    /// Where the template comes from.
    pub template: TemplateSource,
}

/// How to choose the user config file.
#[derive(Debug, Default)]
pub enum ConfigFile {
    /// Search the platform config directory, then `./.stencilrc` (default).
    #[default]
    Search,
    /// `-n`: skip user config.
    Skip,
    /// `-c<file>`: load this specific file.
    Explicit(PathBuf),
}

#[derive(Debug, Default, PartialEq)]
pub enum TemplateSource {
    /// `-` or nothing: read standard input.
    #[default]
    Stdin,
    File(PathBuf),
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut positional: Vec<String> = Vec::new();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            i += 1;
            positional.extend(argv[i..].iter().cloned());
            break;
        }

        // Non-flag argument.
        if !arg.starts_with('-') || arg == "-" {
            positional.push(arg.to_owned());
            i += 1;
            continue;
        }

        // Flag argument: iterate over characters after the leading `-`.
        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'i' => args.ignore_errors = true,
                's' => args.strict = true,
                'n' => args.config = ConfigFile::Skip,

                // -c<file>
                'c' => {
                    let file = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err("-c requires a file argument".to_owned());
                    };
                    args.config = ConfigFile::Explicit(PathBuf::from(file));
                }

                // -D<name>=<value>
                'D' => {
                    let def = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err("-D requires a name=value argument".to_owned());
                    };
                    let (name, value) = def
                        .split_once('=')
                        .ok_or_else(|| format!("-D{def}: expected name=value"))?;
                    if name.is_empty() {
                        return Err(format!("-D{def}: empty name"));
                    }
                    args.defines.push((name.to_owned(), value.to_owned()));
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    match positional.len() {
        0 => {}
        1 => {
            let path = positional.remove(0);
            if path != "-" {
                args.template = TemplateSource::File(PathBuf::from(path));
            }
        }
        n => return Err(format!("too many arguments ({n})")),
    }

    Ok(args)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|&s| s.to_owned()).collect()
    }

    #[test]
    fn empty_args() {
        let a = parse_argv(&argv(&[])).unwrap();
        assert!(!a.ignore_errors && !a.strict);
        assert!(matches!(a.config, ConfigFile::Search));
        assert_eq!(a.template, TemplateSource::Stdin);
    }

    #[test]
    fn template_positional() {
        let a = parse_argv(&argv(&["page.tpl"])).unwrap();
        assert_eq!(a.template, TemplateSource::File(PathBuf::from("page.tpl")));
        let a = parse_argv(&argv(&["-"])).unwrap();
        assert_eq!(a.template, TemplateSource::Stdin);
    }

    #[test]
    fn bool_flags() {
        let a = parse_argv(&argv(&["-i", "-s", "-n"])).unwrap();
        assert!(a.ignore_errors);
        assert!(a.strict);
        assert!(matches!(a.config, ConfigFile::Skip));
    }

    #[test]
    fn combined_bool_flags() {
        let a = parse_argv(&argv(&["-is"])).unwrap();
        assert!(a.ignore_errors && a.strict);
    }

    #[test]
    fn config_embedded() {
        let a = parse_argv(&argv(&["-cmy.conf"])).unwrap();
        assert!(matches!(&a.config, ConfigFile::Explicit(p) if p == &PathBuf::from("my.conf")));
    }

    #[test]
    fn config_separate() {
        let a = parse_argv(&argv(&["-c", "my.conf", "t.tpl"])).unwrap();
        assert!(matches!(&a.config, ConfigFile::Explicit(p) if p == &PathBuf::from("my.conf")));
        assert_eq!(a.template, TemplateSource::File(PathBuf::from("t.tpl")));
    }

    #[test]
    fn defines() {
        let a = parse_argv(&argv(&["-Dname=ada", "-D", "n=3", "-Dempty="])).unwrap();
        assert_eq!(
            a.defines,
            vec![
                ("name".to_owned(), "ada".to_owned()),
                ("n".to_owned(), "3".to_owned()),
                ("empty".to_owned(), String::new()),
            ]
        );
        assert!(parse_argv(&argv(&["-Dnovalue"])).is_err());
        assert!(parse_argv(&argv(&["-D=1"])).is_err());
        assert!(parse_argv(&argv(&["-D"])).is_err());
    }

    #[test]
    fn too_many_positional() {
        assert!(parse_argv(&argv(&["a", "b"])).is_err());
    }

    #[test]
    fn unknown_flag() {
        assert!(parse_argv(&argv(&["-z"])).is_err());
    }
}
