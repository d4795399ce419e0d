use keepmenu_core::sample::{create_sample_database, SAMPLE_PASSWORD};
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("test_db.kdbx"));

    create_sample_database(&path, SAMPLE_PASSWORD)?;

    println!(
        "Created {} with password '{}'",
        path.display(),
        SAMPLE_PASSWORD
    );
    Ok(())
}
