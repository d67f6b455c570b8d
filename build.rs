fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Builds from a source tarball have no .git directory.
    let rev = match std::process::Command::new("git").args(["rev-parse", "--short", "HEAD"]).output()
    {
        Ok(output) if output.status.success() => String::from_utf8(output.stdout)?,
        _ => "unknown".to_string(),
    };
    println!("cargo:rustc-env=GIT_COMMIT_SHA={}", rev.trim());
    println!("cargo:rerun-if-changed=.git/HEAD");
    Ok(())
}
