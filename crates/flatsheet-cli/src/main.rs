//! flatsheet CLI - XLSX to CSV conversion tool

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flatsheet::{
    list_sheets, render, DateMode, MergedHandling, Newline, RenderOptions, SheetSelector,
};
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "flatsheet")]
#[command(author, version, about = "Convert XLSX worksheets to CSV")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert one worksheet to CSV on stdout or into a file
    #[command(alias = "csv")]
    ToCsv {
        /// Input .xlsx file
        input: PathBuf,

        /// Output CSV file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Sheet index to convert (0-based, default: first sheet)
        #[arg(short, long, conflicts_with = "sheet_name")]
        sheet: Option<usize>,

        /// Sheet name to convert
        #[arg(long)]
        sheet_name: Option<String>,

        /// Field delimiter
        #[arg(short, long, default_value = ",")]
        delimiter: char,

        /// Terminate rows with CRLF instead of LF
        #[arg(long)]
        crlf: bool,

        /// Prefix the output with a UTF-8 BOM
        #[arg(long)]
        bom: bool,

        /// Quote every field
        #[arg(long)]
        quote_all: bool,

        /// Repeat merged-cell values across their covered cells
        #[arg(long)]
        propagate_merged: bool,

        /// Drop rows marked hidden
        #[arg(long)]
        skip_hidden_rows: bool,

        /// Drop columns marked hidden
        #[arg(long)]
        skip_hidden_columns: bool,

        /// Emit date-styled cells as raw serial numbers
        #[arg(long)]
        raw_dates: bool,
    },

    /// List the sheets in a workbook
    Sheets {
        /// Input .xlsx file
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::ToCsv {
            input,
            output,
            sheet,
            sheet_name,
            delimiter,
            crlf,
            bom,
            quote_all,
            propagate_merged,
            skip_hidden_rows,
            skip_hidden_columns,
            raw_dates,
        } => {
            let selector = match (sheet_name, sheet) {
                (Some(name), _) => SheetSelector::Name(name),
                (None, Some(index)) => SheetSelector::Index(index),
                (None, None) => SheetSelector::First,
            };

            let mut options = RenderOptions::default();
            options.csv.delimiter = u8::try_from(delimiter)
                .context("delimiter must be a single-byte character")?;
            options.csv.newline = if crlf { Newline::CRLF } else { Newline::LF };
            options.csv.include_bom = bom;
            options.csv.quote_all = quote_all;
            options.csv.merged_handling = if propagate_merged {
                MergedHandling::Propagate
            } else {
                MergedHandling::None
            };
            options.csv.include_hidden_rows = !skip_hidden_rows;
            options.csv.include_hidden_columns = !skip_hidden_columns;
            options.csv.date_mode = if raw_dates { DateMode::Raw } else { DateMode::Iso };

            let csv = render(&input, &selector, &options)
                .with_context(|| format!("Failed to convert '{}'", input.display()))?;

            match output {
                Some(path) => std::fs::write(&path, &csv)
                    .with_context(|| format!("Failed to write '{}'", path.display()))?,
                None => io::stdout()
                    .write_all(&csv)
                    .context("Failed to write to stdout")?,
            }

            Ok(())
        }

        Commands::Sheets { input } => {
            let sheets = list_sheets(&input)
                .with_context(|| format!("Failed to open '{}'", input.display()))?;

            for (i, sheet) in sheets.iter().enumerate() {
                let marker = if sheet.visible { "" } else { " (hidden)" };
                println!("{}: {}{}", i, sheet.name, marker);
            }

            Ok(())
        }
    }
}
