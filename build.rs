//! Embeds git and build metadata read by `src/version.rs`.

use vergen_gitcl::{Build, Emitter, Gitcl};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let timestamp = Build::builder().build_timestamp(true).build();
    let git = Gitcl::builder().branch(true).sha(true).dirty(true).build();

    // Outside a git checkout the VERGEN_GIT_* variables stay unset and
    // version.rs reports "unknown".
    Emitter::default()
        .add_instructions(&timestamp)?
        .add_instructions(&git)?
        .emit()?;
    Ok(())
}
