fn main() {
    if let Err(e) = care_lib::run() {
        tracing::error!("{e}");
        eprintln!("care: {e}");
        std::process::exit(1);
    }
}
