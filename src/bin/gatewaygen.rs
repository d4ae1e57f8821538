fn main() {
    if let Err(err) = gatewaygen::cli::run_cli() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}
