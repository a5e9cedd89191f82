use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "milky",
    author,
    version,
    about = "Browse, search, export and live-preview the milky shader catalog"
)]
pub struct Cli {
    /// Load the catalog from a directory containing `catalog.toml` instead of
    /// the built-in one.
    #[arg(long, global = true, value_name = "DIR", env = "MILKY_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Preview session configuration (TOML). Defaults to
    /// `<config dir>/session.toml` when that file exists.
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        env = "MILKY_SESSION_CONFIG"
    )]
    pub config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List every catalog entry in registration order.
    List,
    /// Filter entries by a case-insensitive term and/or tags.
    Search(SearchArgs),
    /// List the tag vocabulary in first-seen order.
    Tags,
    /// Show one entry's metadata.
    Show {
        #[arg(value_name = "ID")]
        id: String,
    },
    /// Print an entry's fragment source, unmodified.
    Source {
        #[arg(value_name = "ID")]
        id: String,
    },
    /// Write an entry's source to `<DIR>/<ID>.glsl`.
    Export {
        #[arg(value_name = "ID")]
        id: String,
        /// Destination directory.
        #[arg(long, short, value_name = "DIR", default_value = ".")]
        dir: PathBuf,
    },
    /// Translate and validate shaders without touching a GPU.
    Check {
        /// Only check this entry.
        #[arg(value_name = "ID")]
        id: Option<String>,
    },
    /// Open a live preview window.
    Preview(PreviewArgs),
}

#[derive(Parser, Debug, Default)]
pub struct SearchArgs {
    /// Substring matched against names and descriptions.
    #[arg(value_name = "TERM", default_value = "")]
    pub term: String,

    /// Require a tag; repeat to require several.
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreviewMode {
    /// Single modal; arrows switch entries, Escape closes.
    #[default]
    Modal,
    /// Detail-page preview; pauses while the window is unfocused.
    Inline,
    /// Debounced, reduced-fidelity preview while the cursor is over the window.
    Hover,
}

#[derive(Parser, Debug)]
pub struct PreviewArgs {
    #[arg(value_name = "ID")]
    pub id: String,

    /// Preview flavour: `modal`, `inline`, or `hover`.
    #[arg(
        long,
        value_name = "MODE",
        value_parser = parse_preview_mode,
        default_value = "modal"
    )]
    pub mode: PreviewMode,

    /// Logical window size (e.g. `960x540`).
    #[arg(long, value_name = "WxH", value_parser = parse_window_size)]
    pub size: Option<(u32, u32)>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_preview_mode(value: &str) -> Result<PreviewMode, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("preview mode must not be empty".to_string());
    }

    let normalized = trimmed.to_ascii_lowercase();
    match normalized.as_str() {
        "modal" => Ok(PreviewMode::Modal),
        "inline" | "detail" => Ok(PreviewMode::Inline),
        "hover" => Ok(PreviewMode::Hover),
        other => Err(format!(
            "unknown preview mode '{other}'; expected modal, inline, or hover"
        )),
    }
}

pub fn parse_window_size(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WxH format, e.g. 960x540".to_string())?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| "invalid width in size specification".to_string())?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| "invalid height in size specification".to_string())?;

    if width == 0 || height == 0 {
        return Err("window dimensions must be greater than zero".to_string());
    }

    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_preview_modes() {
        assert_eq!(parse_preview_mode("Modal"), Ok(PreviewMode::Modal));
        assert_eq!(parse_preview_mode(" detail "), Ok(PreviewMode::Inline));
        assert_eq!(parse_preview_mode("hover"), Ok(PreviewMode::Hover));
        assert!(parse_preview_mode("fullscreen").is_err());
        assert!(parse_preview_mode("").is_err());
    }

    #[test]
    fn parses_window_size() {
        assert_eq!(parse_window_size("960x540"), Ok((960, 540)));
        assert_eq!(parse_window_size("640X480"), Ok((640, 480)));
        assert!(parse_window_size("0x10").is_err());
        assert!(parse_window_size("wide").is_err());
    }

    #[test]
    fn search_accepts_repeated_tags() {
        let argv = ["milky", "search", "ring", "--tag", "fluid", "--tag", "gl"];
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.term, "ring");
                assert_eq!(args.tags, ["fluid", "gl"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn preview_defaults_to_modal() {
        let cli = Cli::try_parse_from(["milky", "preview", "milky-orb"]).unwrap();
        match cli.command {
            Command::Preview(args) => {
                assert_eq!(args.mode, PreviewMode::Modal);
                assert_eq!(args.size, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
