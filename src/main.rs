fn main() {
    if let Err(err) = kiconnect::cli::main() {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}
