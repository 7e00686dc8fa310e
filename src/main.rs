fn main() {
    if let Err(err) = cloud_inventory::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
