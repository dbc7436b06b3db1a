use release_tool::run_cli;

fn main() -> anyhow::Result<()> {
    run_cli()
}
