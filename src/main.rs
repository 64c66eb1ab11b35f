use segdl::cli::Cli;
use segdl::logging;

fn main() {
    if logging::init_logging().is_err() {
        logging::init_logging_stderr();
    }

    if let Err(err) = Cli::run_from_args() {
        eprintln!("segdl error: {err:#}");
        std::process::exit(1);
    }
}
