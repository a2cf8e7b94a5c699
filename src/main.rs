fn main() {
    if let Err(error) = matching_dashboard_lib::run() {
        eprintln!("matching-dashboard: {error}");
        std::process::exit(1);
    }
}
