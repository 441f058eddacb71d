use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use regime_backtest::commands::{backtest, cagr_history};
use regime_backtest::config::{LoaderConfig, DEFAULT_COLUMN_RANGE, DEFAULT_SHEET_NAME, DEFAULT_SKIP_ROWS};
use std::path::PathBuf;

const DEFAULT_OUTPUT_DIR: &str = "output";
const DEFAULT_CAGR_OUTPUT: &str = "output/CAGR_History.xlsx";

#[derive(Parser)]
#[command(name = "regime-backtest")]
#[command(about = "Backtest a CAGR-regime accumulation strategy on daily closing prices")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone)]
struct InputLayout {
    /// Worksheet holding the price table
    #[arg(long, default_value = DEFAULT_SHEET_NAME)]
    sheet: String,
    /// Rows above the header row in the worksheet
    #[arg(long, default_value_t = DEFAULT_SKIP_ROWS)]
    skip_rows: u32,
    /// Worksheet columns to read, e.g. B:F
    #[arg(long, default_value = DEFAULT_COLUMN_RANGE)]
    columns: String,
}

impl InputLayout {
    fn loader_config(&self) -> Result<LoaderConfig> {
        LoaderConfig {
            sheet_name: self.sheet.clone(),
            skip_rows: self.skip_rows,
            ..LoaderConfig::default()
        }
        .with_column_range(&self.columns)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full backtest and write the three-sheet report
    Backtest {
        /// Price workbooks (.xlsx, .xls, .ods) or CSV files; several files run in parallel
        #[arg(required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,
        /// Directory for report workbooks
        #[arg(short, long = "output-dir", value_name = "DIR", default_value = DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,
        /// Also write each table as a CSV file next to the workbook
        #[arg(long)]
        csv: bool,
        /// Print run summaries as JSON on stdout
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        layout: InputLayout,
    },
    /// Write only the rolling CAGR history with its regime categories
    CagrHistory {
        /// Price workbook or CSV file
        input: PathBuf,
        /// Destination workbook
        #[arg(short, long, value_name = "PATH", default_value = DEFAULT_CAGR_OUTPUT)]
        output: PathBuf,
        #[command(flatten)]
        layout: InputLayout,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting regime backtest. Historical simulation only, not investment advice.");

    match cli.command {
        Commands::Backtest {
            inputs,
            output_dir,
            csv,
            json,
            layout,
        } => {
            let options = backtest::BacktestOptions {
                output_dir,
                loader: layout.loader_config()?,
                write_csv: csv,
            };
            let completed = backtest::run(&inputs, &options)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&completed)?);
            }
        }
        Commands::CagrHistory {
            input,
            output,
            layout,
        } => {
            cagr_history::run(&input, &output, &layout.loader_config()?)?;
        }
    }

    Ok(())
}
