use mend_store::MendPaths;
use std::path::Path;

const GITIGNORE: &str = "LOCK\n";

pub fn execute(repo_root: &Path) -> anyhow::Result<()> {
    let paths = MendPaths::discover(repo_root);
    if paths.is_initialized() {
        println!("Already initialized at {}", paths.mend_dir.display());
        return Ok(());
    }

    paths.ensure_layout()?;
    let gitignore = paths.mend_dir.join(".gitignore");
    if !gitignore.exists() {
        std::fs::write(&gitignore, GITIGNORE)?;
    }
    if !paths.config_json.exists() {
        mend_store::write_config_map(&paths.config_json, &serde_json::Map::new())?;
    }

    println!("Initialized {}", paths.mend_dir.display());
    Ok(())
}
