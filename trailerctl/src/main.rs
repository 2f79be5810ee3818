use clap::Parser;

fn main() {
    let cli = trailerctl::Cli::parse();
    if let Err(err) = trailerctl::run(cli) {
        eprintln!("erro: {err}");
        std::process::exit(1);
    }
}
