//! Minimal CLI parsing for the search, list, validate and test commands.

use std::path::PathBuf;

use anyhow::{Result, anyhow, bail};

use crate::indexer::{SearchRequest, SortField, SortOrder};

pub const USAGE: &str = "\
Usage: indexer-aggregator <command> [options]

Commands:
  search <query>     Search every enabled indexer
      --indexer <id>     Limit to an indexer (repeatable)
      --category <code>  Torznab category filter (repeatable, comma separated)
      --sort <field>     age|title|size|seeders|leechers|grabs|category|indexer
      --order <dir>      asc|desc
      --limit <n>        Page size (default 100)
      --offset <n>       Results to skip
      --fresh            Bypass the result cache
  list [text]        List loaded definitions, optionally filtered
  validate [path]    Load a definition directory and report failures
  test <indexer>     Run a blank query against one indexer
  help               Show this message";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Search(SearchRequest),
    List { filter: Option<String> },
    Validate { path: Option<PathBuf> },
    Test { indexer: String },
    Help,
}

#[derive(Debug, Default)]
pub struct CliOptions {
    pub command: Option<Command>,
}

impl CliOptions {
    pub fn from_args() -> Result<Self> {
        Self::parse(std::env::args().skip(1))
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = args.into_iter().map(Into::into);
        let Some(command) = args.next() else {
            return Ok(CliOptions::default());
        };

        let command = match command.as_str() {
            "search" => Command::Search(parse_search(args)?),
            "list" => Command::List {
                filter: args.next(),
            },
            "validate" => Command::Validate {
                path: args.next().map(PathBuf::from),
            },
            "test" => Command::Test {
                indexer: args.next().ok_or_else(|| anyhow!("test needs an indexer id"))?,
            },
            "help" | "--help" | "-h" => Command::Help,
            other => bail!("unknown command '{}'", other),
        };

        Ok(CliOptions {
            command: Some(command),
        })
    }
}

fn parse_search(mut args: impl Iterator<Item = String>) -> Result<SearchRequest> {
    let mut terms = Vec::new();
    let mut request = SearchRequest::new("");

    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if arg.starts_with("--") => (flag.to_string(), Some(value.to_string())),
            _ => (arg.clone(), None),
        };
        let mut value = |name: &str| {
            inline
                .clone()
                .or_else(|| args.next())
                .ok_or_else(|| anyhow!("{} needs a value", name))
        };

        match flag.as_str() {
            "--indexer" => request.indexer_ids.push(value("--indexer")?),
            "--category" => {
                for code in value("--category")?.split(',').filter(|c| !c.trim().is_empty()) {
                    let code = code
                        .trim()
                        .parse()
                        .map_err(|_| anyhow!("invalid category '{}'", code))?;
                    request.category_ids.push(code);
                }
            }
            "--sort" => request.sort_by = value("--sort")?.parse::<SortField>()?,
            "--order" => request.sort_order = value("--order")?.parse::<SortOrder>()?,
            "--limit" => {
                request.limit = value("--limit")?
                    .parse()
                    .map_err(|_| anyhow!("invalid --limit"))?
            }
            "--offset" => {
                request.offset = value("--offset")?
                    .parse()
                    .map_err(|_| anyhow!("invalid --offset"))?
            }
            "--fresh" => request.fresh = true,
            _ if flag.starts_with("--") => bail!("unknown option '{}'", flag),
            _ => terms.push(arg),
        }
    }

    request.query = terms.join(" ");
    if request.query.trim().is_empty() {
        bail!("search needs a query");
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_search_flags() {
        let options = CliOptions::parse([
            "search",
            "ubuntu",
            "iso",
            "--indexer",
            "linux",
            "--category=2000,5000",
            "--sort",
            "size",
            "--order",
            "asc",
            "--limit",
            "10",
            "--fresh",
        ])
        .unwrap();

        let Some(Command::Search(request)) = options.command else {
            panic!("expected search");
        };
        assert_eq!(request.query, "ubuntu iso");
        assert_eq!(request.indexer_ids, vec!["linux"]);
        assert_eq!(request.category_ids, vec![2000, 5000]);
        assert_eq!(request.sort_by, SortField::Size);
        assert_eq!(request.sort_order, SortOrder::Asc);
        assert_eq!(request.limit, 10);
        assert!(request.fresh);
    }

    #[test]
    fn test_parse_other_commands() {
        let list = CliOptions::parse(["list", "linux"]).unwrap();
        assert_eq!(
            list.command,
            Some(Command::List {
                filter: Some("linux".to_string())
            })
        );
        assert_matches!(CliOptions::parse(["validate"]).unwrap().command, Some(Command::Validate { path: None }));
        assert!(CliOptions::parse(Vec::<String>::new()).unwrap().command.is_none());
    }

    #[test]
    fn test_parse_errors() {
        assert!(CliOptions::parse(["search"]).is_err());
        assert!(CliOptions::parse(["search", "x", "--limit"]).is_err());
        assert!(CliOptions::parse(["search", "x", "--bogus"]).is_err());
        assert!(CliOptions::parse(["frobnicate"]).is_err());
        assert!(CliOptions::parse(["test"]).is_err());
    }
}
