//! Drivehouse CLI - interactive shell over a drive warehouse

use std::io::{self, BufRead, Write};

use drivehouse::{JoinKind, Result, SheetSelector, TableLoad, Warehouse, WarehouseConfig};
use tracing_subscriber::EnvFilter;

const PREVIEW_ROWS: usize = 10;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    println!("Drivehouse v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'help' for available commands, 'exit' to quit.\n");

    let mut warehouse = Warehouse::connect(WarehouseConfig::from_env()?)?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("drivehouse> ");
        if stdout.flush().is_err() {
            break; // Output stream closed
        }

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break, // EOF or read error
            Ok(_) => {}
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some((command, args)) = parts.split_first() else {
            continue;
        };

        let command = command.to_lowercase();
        let outcome = match command.as_str() {
            "exit" | "quit" | ".exit" | ".quit" => {
                println!("Goodbye!");
                break;
            }
            "help" | ".help" => {
                print_help();
                Ok(())
            }
            ".tables" => list_tables(&mut warehouse, args.first() == Some(&"refresh")),
            ".search" => match args.first() {
                Some(keyword) => warehouse.search_tables(keyword).map(|names| print_names(&names)),
                None => usage(".search <keyword>"),
            },
            ".get" | ".refresh" => match args {
                [name, rest @ ..] => show_table(&mut warehouse, name, rest.first(), command == ".refresh"),
                [] => usage(".get <table> [sheet]"),
            },
            ".meta" => {
                show_metadata(&warehouse, args.first().copied());
                Ok(())
            }
            ".join" => match args {
                [left, right, keys, rest @ ..] => join_tables(&mut warehouse, left, right, keys, rest.first()),
                _ => usage(".join <left> <right> <key[,key..]> [inner|left|right|outer]"),
            },
            ".export" => match args {
                [name, path] => export_table(&mut warehouse, name, path),
                _ => usage(".export <table> <file.csv>"),
            },
            ".cache" => {
                println!("{}", warehouse.cache_info());
                Ok(())
            }
            ".clear" => {
                warehouse.clear_cache();
                println!("Cache cleared.");
                Ok(())
            }
            other => {
                println!("Unknown command '{}'. Type 'help' for available commands.", other);
                Ok(())
            }
        };

        if let Err(e) = outcome {
            println!("Error: {}", e);
        }
    }

    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  .tables [refresh]               - List tables (refresh rebuilds the index)");
    println!("  .search <keyword>               - Find tables by name");
    println!("  .get <table> [sheet]            - Load a table and preview it");
    println!("  .refresh <table> [sheet]        - Reload a table, bypassing the cache");
    println!("  .meta [table]                   - Show load metadata");
    println!("  .join <l> <r> <keys> [how]      - Join two tables (how: inner|left|right|outer)");
    println!("  .export <table> <file.csv>      - Write a table to CSV");
    println!("  .cache                          - Show cache statistics");
    println!("  .clear                          - Clear cache and index");
    println!("  exit, quit                      - Exit the CLI");
}

fn usage(text: &str) -> Result<()> {
    println!("Usage: {}", text);
    Ok(())
}

fn print_names(names: &[String]) {
    if names.is_empty() {
        println!("No tables found.");
    }
    for name in names {
        println!("  {}", name);
    }
}

fn list_tables(warehouse: &mut Warehouse, refresh: bool) -> Result<()> {
    let names = warehouse.list_tables(refresh)?;
    print_names(&names);
    println!("({} tables)", names.len());
    Ok(())
}

fn parse_sheet(arg: Option<&&str>) -> Result<Option<SheetSelector>> {
    arg.map(|s| s.parse::<SheetSelector>()).transpose()
}

fn show_table(warehouse: &mut Warehouse, name: &str, sheet: Option<&&str>, refresh: bool) -> Result<()> {
    match warehouse.get_table(name, parse_sheet(sheet)?, refresh)? {
        TableLoad::Loaded(dataset) => {
            let (rows, columns) = dataset.shape();
            println!("{}", dataset.pretty(PREVIEW_ROWS)?);
            match dataset.crs() {
                Some(crs) => println!("{} rows x {} columns, crs {}", rows, columns, crs),
                None => println!("{} rows x {} columns", rows, columns),
            }
        }
        TableLoad::NotFound { name, suggestions } => {
            println!("Table '{}' not found.", name);
            if !suggestions.is_empty() {
                println!("Available tables: {}...", suggestions.join(", "));
            }
        }
        TableLoad::Unreadable { name, reason } => {
            println!("Table '{}' could not be read: {}", name, reason);
        }
    }
    Ok(())
}

fn show_metadata(warehouse: &Warehouse, name: Option<&str>) {
    match name {
        Some(name) => match warehouse.metadata(name) {
            Some(meta) => println!("{}", meta),
            None => println!("No metadata for '{}'. Load it first with .get", name),
        },
        None => {
            if warehouse.all_metadata().is_empty() {
                println!("No tables loaded yet.");
            }
            for (name, meta) in warehouse.all_metadata() {
                println!("[{}]\n{}\n", name, meta);
            }
        }
    }
}

fn join_tables(
    warehouse: &mut Warehouse,
    left: &str,
    right: &str,
    keys: &str,
    how: Option<&&str>,
) -> Result<()> {
    let kind = match how {
        Some(how) => how.parse::<JoinKind>()?,
        None => JoinKind::default(),
    };
    let on: Vec<&str> = keys.split(',').filter(|k| !k.is_empty()).collect();
    let joined = warehouse.join_tables(left, right, &on, kind, None)?;
    println!("{}", joined.pretty(PREVIEW_ROWS)?);
    println!("{} rows x {} columns", joined.num_rows(), joined.num_columns());
    Ok(())
}

fn export_table(warehouse: &mut Warehouse, name: &str, path: &str) -> Result<()> {
    match warehouse.get_table(name, None, false)?.into_dataset() {
        Some(dataset) => {
            dataset.write_csv(path)?;
            println!("Wrote {} rows to {}", dataset.num_rows(), path);
        }
        None => println!("Table '{}' could not be loaded.", name),
    }
    Ok(())
}
