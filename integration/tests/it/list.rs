use color_eyre::{eyre::Context, Result};
use simple_test_case::test_case;
use xshell::{cmd, Shell};

#[test_case(
    "registry-1.docker.io/library/alpine:latest";
    "alpine:latest"
)]
#[test_log::test]
#[cfg_attr(not(feature = "test-registry-interop"), ignore = "skipping tests that hit a real registry")]
fn registry(image: &str) -> Result<()> {
    let workspace = crate::workspace_root();

    tracing::info!(workspace = %workspace.display(), "create shell");
    let sh = Shell::new().context("create shell")?;
    sh.change_dir(&workspace);

    tracing::info!(image, "run stevedore list");
    let output = cmd!(sh, "cargo run -- list {image}").read()?;
    assert!(!output.is_empty(), "list should print a non-empty layer listing");

    Ok(())
}
