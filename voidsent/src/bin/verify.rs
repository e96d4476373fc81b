use std::{env, path::Path};

use colored::Colorize;

use voidsent::il::{analysis::validate, io::read_listing};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let paths: Vec<String> = env::args().skip(1).collect();
    if paths.is_empty() {
        anyhow::bail!("usage: voidsent-verify <listing.il>...");
    }

    let mut broken = 0;
    for path in &paths {
        let stream = read_listing(Path::new(path))?;
        let violations = validate(&stream);
        if violations.is_empty() {
            println!("{} {path} ({} instructions)", "ok".green(), stream.len());
            continue;
        }
        broken += 1;
        println!("{} {path}", "broken".red());
        for violation in violations {
            println!("    {violation}");
        }
    }

    if broken > 0 {
        anyhow::bail!("{broken} of {} listings have label violations", paths.len());
    }
    Ok(())
}
