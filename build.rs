use vergen_gitcl::{Emitter, GitclBuilder};

// Emits VERGEN_GIT_SHA for the CLI version string. Outside of a git checkout vergen emits
// nothing and the package version is used instead.
fn main() -> anyhow::Result<()> {
    let git = GitclBuilder::default().sha(true).build()?;

    Emitter::default().add_instructions(&git)?.emit()?;

    Ok(())
}
