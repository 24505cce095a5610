//! Installation info command.

use std::path::PathBuf;

use llamapen::{paths, Model};

/// Show data paths and which assets are installed.
pub(crate) fn run(base_dir: Option<PathBuf>) -> miette::Result<()> {
    let base_dir = base_dir.unwrap_or_else(paths::default_base_dir);

    println!("Data directory: {}", base_dir.display());

    let exe = paths::executable_path(&base_dir);
    println!(
        "Executable:     {} ({})",
        exe.display(),
        if exe.exists() { "installed" } else { "missing" }
    );

    println!("Models:");
    for model in Model::ALL {
        let path = paths::model_path(&base_dir, model);
        println!(
            "  {:>4}  {}",
            model,
            if path.exists() { "installed" } else { "missing" }
        );
    }

    if !exe.exists() {
        println!();
        println!("To install assets, run:");
        println!("  llamapen pull --model 7B");
    }

    Ok(())
}
