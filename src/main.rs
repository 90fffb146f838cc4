fn main() {
    if let Err(err) = db_remap::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
