use anyhow::Result;
use pat_decoder::data_loading::inspect_csv_file;
use std::path::Path;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        println!("Usage: {} <recording.csv>", args[0]);
        std::process::exit(1);
    }

    let info = inspect_csv_file(Path::new(&args[1]))?;

    println!("\nColumns:");
    for (i, column) in info.columns.iter().enumerate() {
        println!("  {}: {}", i, column);
    }
    println!("\nRows: {}", info.rows);

    Ok(())
}
