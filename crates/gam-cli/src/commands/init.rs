//! `gam init` — bootstrap the store, queue, and manifest.

use anyhow::Result;

use super::AppContext;

pub fn run() -> Result<()> {
    let ctx = AppContext::load()?;

    let arch = ctx.config.project_root.join("arch.md");
    if !arch.exists() {
        std::fs::write(
            &arch,
            "# Architecture\n# Region markers define the namespace tree for this project.\n\n\
             # @region:app\n# @endregion:app\n",
        )?;
        println!("Created {}", arch.display());
    }

    let gamignore = ctx.config.project_root.join(".gamignore");
    if !gamignore.exists() {
        std::fs::write(&gamignore, "# Paths the region scanner skips\ntarget/\ndocs/\n")?;
        println!("Created {}", gamignore.display());
    }

    let report = ctx.reconciler().sync()?;
    println!(
        "Store ready at {} ({} region(s) imported from arch.md)",
        ctx.config.store_path.display(),
        report.added_to_store.len()
    );
    println!("Queue ready at {}", ctx.config.queue_path.display());
    Ok(())
}
