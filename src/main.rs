fn main() {
    if let Err(err) = mastery_timer::run() {
        eprintln!("mastery-timer: {err:#}");
        std::process::exit(1);
    }
}
