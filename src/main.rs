use rxclaims::CliError;

fn is_json_args() -> bool {
    std::env::args().any(|arg| arg == "--json")
}

fn report(err: &CliError) {
    if err.message.is_empty() {
        return;
    }
    if is_json_args() {
        let payload = serde_json::json!({ "error": err });
        eprintln!("{payload}");
    } else {
        // clap usage errors are already prefixed
        if err.message.starts_with("error:") {
            eprintln!("{}", err.message);
        } else {
            eprintln!("error: {}", err.message);
        }
        if let Some(hint) = &err.hint {
            eprintln!("hint: {hint}");
        }
    }
}

fn main() {
    // Load .env early; ignore if missing.
    dotenvy::dotenv().ok();

    let raw_args: Vec<String> = std::env::args().collect();
    let result = rxclaims::parse_cli(raw_args).and_then(rxclaims::run_with_parsed);

    if let Err(err) = result {
        report(&err);
        std::process::exit(err.code);
    }
}
