fn main() {
    if let Err(err) = csv_blend::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
