/// Get the version string for ctr and libctr
pub fn get_version_string() -> String {
    format!(
        "ctr {}\nlibctr {}",
        env!("CARGO_PKG_VERSION"),
        libctr::version()
    )
}

/// Print version information to stdout
pub fn print_version() {
    println!("{}", get_version_string());
}

#[cfg(test)]
#[path = "version_tests.rs"]
mod tests;
