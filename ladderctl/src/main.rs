use clap::Parser;

fn main() {
    let cli = ladderctl::Cli::parse();
    if let Err(err) = ladderctl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
