fn main() {
    if let Err(err) = sinan_stats::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
