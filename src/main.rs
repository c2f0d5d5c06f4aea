fn main() {
    #[cfg(feature = "cli")]
    vcdiff_stream::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("vcdiff-stream: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
