fn main() {
    if let Err(e) = routebuster::app::run_cli() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
