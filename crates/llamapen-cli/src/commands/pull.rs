//! Asset download command.

use std::path::PathBuf;

use llamapen::{paths, Model, Provisioner};

/// Fetch the executable and model weights.
pub(crate) async fn run(
    model: &str,
    base_dir: Option<PathBuf>,
    force: bool,
) -> miette::Result<()> {
    let model: Model = model
        .parse()
        .map_err(|e| miette::miette!("{}", e))?;
    let base_dir = base_dir.unwrap_or_else(paths::default_base_dir);

    println!("Fetching assets for model '{}'...", model);
    println!("This may take a while depending on your connection.");
    println!();

    Provisioner::new(&base_dir)
        .ensure_assets(model, force)
        .await
        .map_err(|e| miette::miette!("Failed to fetch assets: {}", e))?;

    println!();
    println!("Assets ready.");
    println!("  Executable: {}", paths::executable_path(&base_dir).display());
    println!("  Model:      {}", paths::model_path(&base_dir, model).display());

    Ok(())
}
