fn main() {
    env_logger::init();
    std::process::exit(sg_cli::run_cli_from_args(std::env::args_os()));
}
