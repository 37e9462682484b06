//! Line-driven front-end over a drill session

use anyhow::{anyhow, bail, Result};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};

use ax_core::{Dimension, Row, SortDirection, SortOrder};
use ax_data::Granularity;
use ax_views::{BrowserView, DrillSession, TabBoard};

const HELP: &str = "\
Entity table:
  search <text>            filter entity names (no text clears)
  min <value|none>         minimum total value
  sort <column> [asc|desc] sort the table
  page <n> | next | prev   change page
  list                     print the current page
  refresh                  fetch immediately
  dataset <dimension>      browse contractor, area, organization or category
  slice <all_time|YYYY|YYYY-qN>
Drill:
  open <row|name>          drill into an entity of the table
  tab <dimension> <row|name>  drill into a related entity
  back | close             leave the current level or the whole drill
  contracts page <n>       page through the contracts tab
  contracts sort <column> [asc|desc]
  show                     print every tab
  quit";

/// An entity picked by row number (1-based) or by name
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Row(usize),
    Name(String),
}

impl Target {
    fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            bail!("missing row number or name");
        }
        Ok(match text.parse::<usize>() {
            Ok(row) => Target::Row(row),
            Err(_) => Target::Name(text.to_string()),
        })
    }

    fn resolve(&self, names: &[String]) -> Result<String> {
        match self {
            Target::Name(name) => Ok(name.clone()),
            Target::Row(row) => row
                .checked_sub(1)
                .and_then(|idx| names.get(idx))
                .cloned()
                .ok_or_else(|| anyhow!("no row {} (showing {})", row, names.len())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Quit,
    Search(String),
    MinTotal(Option<f64>),
    Sort(SortOrder),
    Page(usize),
    Next,
    Previous,
    List,
    Refresh,
    Dataset(Dimension),
    Slice(Granularity),
    Open(Target),
    Tab(Dimension, Target),
    Back,
    Close,
    ContractsPage(usize),
    ContractsSort(SortOrder),
    Show,
}

fn parse_sort(args: &str) -> Result<SortOrder> {
    let mut parts = args.split_whitespace();
    let column = parts.next().ok_or_else(|| anyhow!("missing sort column"))?;
    let direction = match parts.next() {
        Some(dir) => dir.parse::<SortDirection>().map_err(|e| anyhow!(e))?,
        None => SortDirection::Desc,
    };
    Ok(SortOrder::new(column, direction))
}

/// Pages are typed 1-based
fn parse_page(args: &str) -> Result<usize> {
    let page: usize = args.trim().parse().map_err(|_| anyhow!("invalid page '{}'", args.trim()))?;
    page.checked_sub(1).ok_or_else(|| anyhow!("pages start at 1"))
}

/// Parse one input line; blank lines yield `None`
pub fn parse(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, args) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let args = args.trim();

    let command = match word.to_ascii_lowercase().as_str() {
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "search" => Command::Search(args.to_string()),
        "min" => match args {
            "" | "none" => Command::MinTotal(None),
            value => Command::MinTotal(Some(value.parse().map_err(|_| anyhow!("invalid amount '{}'", value))?)),
        },
        "sort" => Command::Sort(parse_sort(args)?),
        "page" => Command::Page(parse_page(args)?),
        "next" => Command::Next,
        "prev" | "previous" => Command::Previous,
        "list" | "ls" => Command::List,
        "refresh" => Command::Refresh,
        "dataset" => Command::Dataset(args.parse()?),
        "slice" => Command::Slice(args.parse().map_err(|e| anyhow!("{}", e))?),
        "open" => Command::Open(Target::parse(args)?),
        "tab" => {
            let (dimension, target) = args
                .split_once(char::is_whitespace)
                .ok_or_else(|| anyhow!("usage: tab <dimension> <row|name>"))?;
            Command::Tab(dimension.parse()?, Target::parse(target)?)
        }
        "back" => Command::Back,
        "close" => Command::Close,
        "contracts" => {
            let (sub, rest) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
            match sub {
                "page" => Command::ContractsPage(parse_page(rest)?),
                "sort" => Command::ContractsSort(parse_sort(rest)?),
                _ => bail!("usage: contracts page <n> | contracts sort <column> [asc|desc]"),
            }
        }
        "show" => Command::Show,
        other => bail!("unknown command '{}' (try help)", other),
    };
    Ok(Some(command))
}

/// Read commands from stdin until `quit` or end of input
pub async fn run(mut session: DrillSession) -> Result<()> {
    println!("{}\n", HELP);
    session.browser().refresh_now();
    session.idle().await;
    print_browser(&session.browser_view());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("error: {}", e);
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }
        if let Err(e) = execute(&mut session, command).await {
            println!("error: {}", e);
        }
    }

    tracing::info!("Session ended");
    Ok(())
}

async fn execute(session: &mut DrillSession, command: Command) -> Result<()> {
    let browser = session.browser();
    match command {
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
        Command::Search(text) => browser.set_search(&text),
        Command::MinTotal(min) => browser.set_min_total(min),
        Command::Sort(order) => browser.sort_by(order),
        Command::Page(page) => browser.goto_page(page),
        Command::Next => browser.next_page(),
        Command::Previous => browser.previous_page(),
        Command::Refresh => browser.refresh_now(),
        Command::List => {
            if browser.is_pending() {
                browser.refresh_now();
            }
            session.idle().await;
            print_browser(&session.browser_view());
        }
        Command::Dataset(dimension) => session.set_dataset(dimension),
        Command::Slice(granularity) => session.set_granularity(granularity),
        Command::Open(target) => {
            let name = target.resolve(&browser.view().entities())?;
            session.drill(&name)?;
            settle_and_show(session).await;
        }
        Command::Tab(dimension, target) => {
            let board = session.snapshot();
            let names: Vec<String> = board
                .related
                .get(&dimension)
                .map(|tab| tab.rows.iter().map(|r| r.entity.clone()).collect())
                .unwrap_or_default();
            let name = target.resolve(&names)?;
            session.drill_from_tab(&name, dimension)?;
            settle_and_show(session).await;
        }
        Command::Back => {
            if session.go_back()?.is_open() {
                settle_and_show(session).await;
            } else {
                println!("Drill closed");
            }
        }
        Command::Close => {
            session.close();
            println!("Drill closed");
        }
        Command::ContractsPage(page) => {
            let page_size = session.tabs().settings().contracts_page_size;
            session.page_contracts(page * page_size)?;
            settle_and_show(session).await;
        }
        Command::ContractsSort(order) => {
            session.sort_contracts(order)?;
            settle_and_show(session).await;
        }
        Command::Show => settle_and_show(session).await,
    }
    Ok(())
}

async fn settle_and_show(session: &DrillSession) {
    session.tabs().idle().await;
    print_board(&session.snapshot());
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) if n.is_f64() => format!("{:.2}", f),
            _ => n.to_string(),
        },
        Some(other) => other.to_string(),
    }
}

fn print_rows(rows: &[Row], first_row: usize) {
    let Some(first) = rows.first() else {
        println!("  (no rows)");
        return;
    };
    let header: Vec<&str> = first.keys().map(String::as_str).collect();
    println!("  #  | {}", header.join(" | "));
    for (idx, row) in rows.iter().enumerate() {
        let cells: Vec<String> = header.iter().map(|key| cell(row.get(*key))).collect();
        println!("  {:<3}| {}", first_row + idx + 1, cells.join(" | "));
    }
}

fn print_browser(view: &BrowserView) {
    if let Some(error) = &view.error {
        println!("!! {}", error);
        return;
    }
    let pager = view.query.pager;
    println!(
        "{} (page {} of {}, {} entities, sorted by {})",
        view.dimension.label(),
        pager.page() + 1,
        view.page_count().max(1),
        view.total_count,
        view.query.order_by
    );
    print_rows(&view.rows, 0);
}

fn print_board(board: &TabBoard) {
    let Some(context) = &board.context else {
        println!("No drill open");
        return;
    };
    println!("== {}", context.breadcrumb());

    for (dimension, tab) in &board.related {
        println!("-- {} [{}]", dimension.label(), dimension.key());
        if tab.loading {
            println!("  loading...");
        } else if let Some(error) = &tab.error {
            println!("  !! {}", error);
        } else if tab.rows.is_empty() {
            println!("  (no rows)");
        } else {
            for (idx, entity) in tab.rows.iter().enumerate() {
                println!(
                    "  {:<3}| {} | {} contracts | total {:.2} | avg {:.2} | {} .. {}",
                    idx + 1,
                    entity.entity,
                    entity.contract_count,
                    entity.total_value,
                    entity.average_value,
                    entity.first_date.as_deref().unwrap_or("-"),
                    entity.last_date.as_deref().unwrap_or("-"),
                );
            }
        }
    }

    let contracts = &board.contracts;
    println!(
        "-- Contracts (page {} of {}, {} contracts, sorted by {})",
        contracts.pager.page() + 1,
        contracts.pager.page_count(contracts.total_count).max(1),
        contracts.total_count,
        contracts.order_by
    );
    if contracts.loading {
        println!("  loading...");
    } else if let Some(error) = &contracts.error {
        println!("  !! {}", error);
    } else {
        print_rows(&contracts.rows, contracts.page_offset());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse("  ").unwrap(), None);
        assert_eq!(parse("search O'Brien").unwrap(), Some(Command::Search("O'Brien".into())));
        assert_eq!(parse("open 3").unwrap(), Some(Command::Open(Target::Row(3))));
        assert_eq!(
            parse("tab area Old Town").unwrap(),
            Some(Command::Tab(Dimension::Area, Target::Name("Old Town".into())))
        );
        assert_eq!(
            parse("contracts sort contract_amount asc").unwrap(),
            Some(Command::ContractsSort(SortOrder::asc("contract_amount")))
        );
        assert_eq!(parse("contracts page 2").unwrap(), Some(Command::ContractsPage(1)));
        assert_eq!(
            parse("slice 2023-q1").unwrap(),
            Some(Command::Slice(Granularity::Quarter { year: 2023, quarter: 1 }))
        );
        assert_eq!(parse("min none").unwrap(), Some(Command::MinTotal(None)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("page 0").is_err());
        assert!(parse("tab area").is_err());
        assert!(parse("dataset planets").is_err());
        assert!(parse("frobnicate").is_err());
    }

    #[test]
    fn test_resolve_target() {
        let names = vec!["ACME CORP".to_string(), "Globex".to_string()];
        assert_eq!(Target::Row(2).resolve(&names).unwrap(), "Globex");
        assert!(Target::Row(0).resolve(&names).is_err());
        assert!(Target::Row(3).resolve(&names).is_err());
        assert_eq!(Target::Name("Initech".into()).resolve(&names).unwrap(), "Initech");
    }
}
