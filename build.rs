pub fn main() {
    // Migrations are embedded with embed_migrations!, so rebuild when they change
    println!("cargo:rerun-if-changed=migrations");

    // Configure static linking for musl targets (used by cross for static builds)
    let target = std::env::var("TARGET").unwrap_or_default();
    if target.contains("musl") {
        configure_musl_static_linking();
    }
}

/// Configure static linking for musl targets
///
/// For musl targets libpq is built from source (bundled mode) so that
/// libpgcommon.a and libpgport.a are available. Enabled via the
/// bundled-postgres feature.
fn configure_musl_static_linking() {
    println!("cargo:warning=Configuring bundled PostgreSQL build for musl static linking");

    #[cfg(not(feature = "bundled-postgres"))]
    {
        println!("cargo:warning=bundled-postgres feature not enabled - build may fail!");
        println!("cargo:warning=Use: cargo build --features bundled-postgres");
    }
}
