use smartspec::cli;

#[tokio::main]
async fn main() {
    match cli::run().await {
        Ok(code) => std::process::exit(code.as_i32()),
        Err(error) => {
            eprintln!("error: {error:#}");
            std::process::exit(smartspec::ExitCode::INTERNAL.as_i32());
        }
    }
}
