use std::path::PathBuf;

use complexapp_tui::app::RunOptions;

const HELP: &str = "ComplexApp-TUI - Blog, follow and chat on ComplexApp from the terminal.

  --version, -V        Show version and exit
  --help,    -h        Show this help message
  --config <path>      Read configuration from <path>
  --offline            Use built-in demo data instead of the backend
  --route <path>       Open at a route such as /profile/someone";

enum Cli {
    Run(RunOptions),
    Exit,
}

fn main() {
    let options = match parse_args(std::env::args().skip(1)) {
        Ok(Cli::Run(options)) => options,
        Ok(Cli::Exit) => return,
        Err(message) => {
            eprintln!("error: {message}\n\n{HELP}");
            std::process::exit(2);
        }
    };

    if let Err(err) = complexapp_tui::run(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Cli, String> {
    let mut options = RunOptions::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("complexapp-tui {}", complexapp_tui::VERSION);
                return Ok(Cli::Exit);
            }
            "--help" | "-h" => {
                println!("{HELP}");
                return Ok(Cli::Exit);
            }
            "--offline" => options.offline = true,
            "--config" => {
                let path = args.next().ok_or("--config needs a path")?;
                options.config_file = Some(PathBuf::from(path));
            }
            "--route" => {
                let route = args.next().ok_or("--route needs a path")?;
                options.initial_route = Some(route);
            }
            other => return Err(format!("unknown argument {other}")),
        }
    }
    Ok(Cli::Run(options))
}
