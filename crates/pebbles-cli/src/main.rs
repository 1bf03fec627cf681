fn main() {
    let code = pebbles_cli::run();
    if code != 0 {
        std::process::exit(code);
    }
}
