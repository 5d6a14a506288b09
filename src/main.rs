fn main() {
    if let Err(err) = allm::cli::main() {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}
