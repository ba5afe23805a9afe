//! Compiles `.proto` files into Rust modules and a `descriptors.bin` descriptor set that
//! `gsi --schema` can read.
use anyhow::{Context, bail};
use clap::Parser;
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(name = "build-proto", version, about = "Compile .proto files for gsi")]
struct Args {
    /// Directory holding the .proto files, also used as the include path
    proto_dir: PathBuf,

    /// Where the generated modules and descriptors.bin are written
    #[arg(short, long, default_value = "generated")]
    out_dir: PathBuf,

    /// Compile only these files. A path that does not exist as given is looked up in the
    /// proto directory
    #[arg(short, long = "file")]
    files: Vec<PathBuf>,

    /// Also generate server traits
    #[arg(long)]
    server: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let protos = if args.files.is_empty() {
        find_protos(&args.proto_dir)?
    } else {
        args.files
            .iter()
            .map(|f| resolve_proto(&args.proto_dir, f))
            .collect()
    };
    if protos.is_empty() {
        bail!("no .proto files in '{}'", args.proto_dir.display());
    }

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create '{}'", args.out_dir.display()))?;

    println!("Compiling {} proto file(s)...", protos.len());

    tonic_prost_build::configure()
        .build_server(args.server)
        .build_client(true)
        .out_dir(&args.out_dir)
        .file_descriptor_set_path(args.out_dir.join("descriptors.bin"))
        .compile_protos(&protos, &[&args.proto_dir])
        .context("failed to compile protos")?;

    println!("Done! Generated files are in {}", args.out_dir.display());

    Ok(())
}

fn resolve_proto(proto_dir: &Path, file: &Path) -> PathBuf {
    if file.exists() {
        file.to_path_buf()
    } else {
        proto_dir.join(file)
    }
}

fn find_protos(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read '{}'", dir.display()))?;

    let mut protos = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "proto") {
            protos.push(path);
        }
    }
    protos.sort();
    Ok(protos)
}
