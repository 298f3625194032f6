//! Build script for AutoFish
//! Reads the VERSION file and exposes it as the APP_VERSION environment
//! variable. On Windows it also embeds a manifest requesting elevation,
//! since input simulation and global hotkeys need it on some setups.

fn main() {
    // VERSION file contains just the version number (e.g., "1.0.0")
    let version = std::fs::read_to_string("VERSION")
        .expect("VERSION file not found")
        .trim()
        .to_string();

    // The 'v' prefix is added here for display purposes (e.g., "v1.0.0")
    println!("cargo:rustc-env=APP_VERSION=v{}", version);
    println!("cargo:rerun-if-changed=VERSION");

    #[cfg(windows)]
    {
        embed_windows_resources();
    }
}

#[cfg(windows)]
fn embed_windows_resources() {
    let mut res = winres::WindowsResource::new();

    res.set_manifest_file("autofish.manifest");

    if std::path::Path::new("icons/icon.ico").exists() {
        res.set_icon("icons/icon.ico");
    }

    if let Err(e) = res.compile() {
        eprintln!("Warning: Failed to compile Windows resources: {}", e);
        // Don't fail the build, just warn
    }
}
