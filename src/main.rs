#[macro_use]
extern crate clap;

use asmline::gen::render;
use clap::{App, Arg, SubCommand};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug)]
enum IOErrorContext {
    ReadInput,
    WriteOutput,
}

#[derive(Debug)]
enum Error {
    Gen(asmline::GenError),
    Io(std::io::Error, IOErrorContext, PathBuf),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err, context, path) => write!(
                f,
                "{} file \"{}\" failed: {}",
                match context {
                    IOErrorContext::ReadInput => "reading input",
                    IOErrorContext::WriteOutput => "writing output",
                },
                path.display(),
                err
            ),
            Error::Gen(err) => write!(f, "compiling instruction database failed: {err}"),
        }
    }
}

fn main() {
    let matches = app_from_crate!()
        .subcommand(
            SubCommand::with_name("parse")
                .about("Parses one pre-processed assembly line per file line and prints the resulting instruction records")
                .arg(Arg::with_name("FILE").help("Input file, one instruction per line").required(true).index(1))
                .arg(
                    Arg::with_name("bits")
                        .long("bits")
                        .takes_value(true)
                        .possible_values(&["16", "32", "64"])
                        .default_value("32")
                        .help("Addressing mode"),
                ),
        )
        .subcommand(
            SubCommand::with_name("gen-tables")
                .about("Compiles an insns.dat-style instruction database into the generator output tables")
                .arg(Arg::with_name("INSNS").help("Instruction database file").required(true).index(1))
                .arg(
                    Arg::with_name("output")
                        .short("o")
                        .long("output")
                        .takes_value(true)
                        .value_name("OUT_DIR")
                        .required(true)
                        .help("Directory to write the generated table sources to"),
                ),
        )
        .get_matches();

    let result = match matches.subcommand() {
        ("parse", Some(sub)) => run_parse(sub),
        ("gen-tables", Some(sub)) => run_gen_tables(sub),
        _ => {
            println!("{}", matches.usage());
            return;
        }
    };

    if let Err(err) = result {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run_parse(sub: &clap::ArgMatches) -> Result<(), Error> {
    let input_path = Path::new(sub.value_of("FILE").unwrap());
    let bits: u32 = sub.value_of("bits").unwrap().parse().unwrap();

    let text = fs::read_to_string(input_path)
        .map_err(|err| Error::Io(err, IOErrorContext::ReadInput, input_path.to_owned()))?;

    let opts = asmline::ParseOptions { bits, ..Default::default() };
    let mut sink = asmline::StderrSink::default();

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let instr = asmline::parse_line(line, &opts, &mut sink);
        println!("{instr:?}");
    }
    Ok(())
}

fn run_gen_tables(sub: &clap::ArgMatches) -> Result<(), Error> {
    let input_path = Path::new(sub.value_of("INSNS").unwrap());
    let out_dir = PathBuf::from(sub.value_of("output").unwrap());

    let text = fs::read_to_string(input_path)
        .map_err(|err| Error::Io(err, IOErrorContext::ReadInput, input_path.to_owned()))?;

    let db = asmline::compile_database(&text).map_err(Error::Gen)?;

    fs::create_dir_all(&out_dir)
        .map_err(|err| Error::Io(err, IOErrorContext::WriteOutput, out_dir.clone()))?;

    let outputs: &[(&str, String)] = &[
        ("insnsb.rs", render::render_insnsb(&db)),
        ("insnsa.rs", render::render_insnsa(&db)),
        ("insnsd.rs", render::render_insnsd(&db)),
        ("insnsi.rs", render::render_insnsi(&db)),
        ("insnsn.rs", render::render_insnsn(&db)),
    ];

    for (name, content) in outputs {
        let path = out_dir.join(name);
        let mut file = fs::File::create(&path)
            .map_err(|err| Error::Io(err, IOErrorContext::WriteOutput, path.clone()))?;
        file.write_all(content.as_bytes())
            .map_err(|err| Error::Io(err, IOErrorContext::WriteOutput, path.clone()))?;
    }

    Ok(())
}
