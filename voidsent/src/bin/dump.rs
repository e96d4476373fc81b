use std::{env, fs::File, io::BufWriter};

use anyhow::Context;

use voidsent::{exchange::SiteFile, sites::builtin_sites};

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let output_json = args.get(1).context("usage: voidsent-dump <output.json>")?;

    let file = File::create(output_json).with_context(|| format!("creating {output_json}"))?;
    let writer = BufWriter::new(file);

    let sites = SiteFile {
        sites: builtin_sites(),
    };
    serde_json::to_writer_pretty(writer, &sites)?;

    Ok(())
}
