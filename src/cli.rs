use anyhow::Context;
use clap::{Args, CommandFactory, Parser, Subcommand};
use flate2::read::MultiGzDecoder;
use log::{info, warn};
use std::{
    fs::File,
    io::{stdin, stdout, BufWriter, IsTerminal, Read, Write},
    path::{Path, PathBuf},
};

use subconv::{
    registry, ExportOptions, Exporter, LineEnding, ParseOptions, Parser as SubtitleParser,
    SaveOptions, Subtitle,
};

fn valid_fps(s: &str) -> Result<f64, String> {
    let fps: f64 = s
        .parse()
        .map_err(|_| format!("`{s}` isn't a valid frame rate"))?;
    if !fps.is_finite() || fps <= 0.0 {
        Err(format!("`{s}` isn't a valid frame rate"))
    } else {
        Ok(fps)
    }
}

/// Resolves a format given on the command line to its registered name.
///
/// Registered names are accepted in any case, as are the usual file
/// extensions.
fn format_name(s: &str) -> Option<&'static str> {
    let wanted = match s.to_ascii_lowercase().as_str() {
        "srt" => "subrip".to_owned(),
        "sub" => "microdvd".to_owned(),
        other => other.to_owned(),
    };
    registry::parsers()
        .iter()
        .map(|p| p.name())
        .chain(registry::exporters().iter().map(|e| e.name()))
        .find(|name| name.to_ascii_lowercase() == wanted)
}

fn parser_format(s: &str) -> Result<&'static str, String> {
    format_name(s)
        .filter(|name| registry::parser(name).is_some())
        .ok_or_else(|| format!("`{s}` is not a format that can be read"))
}

fn exporter_format(s: &str) -> Result<&'static str, String> {
    format_name(s)
        .filter(|name| registry::exporter(name).is_some())
        .ok_or_else(|| format!("`{s}` is not a format that can be written"))
}

fn extension_for(format: &str) -> &'static str {
    match format {
        "SubRip" => "srt",
        "MicroDVD" => "sub",
        _ => "txt",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum InputOutputLocation {
    Path(PathBuf),
    Stdio,
}

impl InputOutputLocation {
    fn new(path: PathBuf) -> Self {
        if path.as_os_str() == "-" {
            Self::Stdio
        } else {
            Self::Path(path)
        }
    }

    /// Picks where to write when `-o` may be missing.
    ///
    /// Without `-o` the output goes to stdout when it is piped or when
    /// the input came from stdin, otherwise to the input's file stem with
    /// `extension` in the current working directory.
    fn resolve(output: Option<PathBuf>, input: &Path, extension: &str) -> Self {
        if let Some(output) = output {
            return Self::new(output);
        }
        if !stdout().is_terminal() || input.as_os_str() == "-" {
            return Self::Stdio;
        }
        match input.file_stem() {
            Some(filename) => {
                let mut filename = filename.to_os_string();
                filename.push(".");
                filename.push(extension);
                let mut path = PathBuf::new();
                path.set_file_name(filename);
                Self::Path(path)
            }
            None => Cli::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    "could not determine filename for input file",
                )
                .exit(),
        }
    }

    fn read_bytes(&self) -> anyhow::Result<Vec<u8>> {
        match self {
            InputOutputLocation::Path(path) => {
                std::fs::read(path).with_context(|| format!("could not read {}", path.display()))
            }
            InputOutputLocation::Stdio => {
                let mut buffer = Vec::new();
                stdin().lock().read_to_end(&mut buffer)?;
                Ok(buffer)
            }
        }
    }

    fn create(&self) -> anyhow::Result<Box<dyn Write>> {
        match self {
            InputOutputLocation::Path(path) => {
                let file = File::create(path)
                    .with_context(|| format!("could not create {}", path.display()))?;
                Ok(Box::new(BufWriter::new(file)))
            }
            InputOutputLocation::Stdio => Ok(Box::new(stdout().lock())),
        }
    }

    fn export(&self, exporter: &Exporter, subtitle: &Subtitle) -> anyhow::Result<()> {
        let mut writer = self.create()?;
        exporter.export(&mut writer, subtitle)?;
        if let InputOutputLocation::Path(path) = self {
            info!("wrote {} units to {}", subtitle.len(), path.display());
        }
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Prints more diagnostics, can be repeated.
    ///
    /// The `RUST_LOG` environment variable takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Subcommands,
}

#[derive(Subcommand, Debug)]
pub enum Subcommands {
    /// Converts a subtitle file into another format or encoding
    Convert(ConvertArgs),
    /// Parses a subtitle file and writes it in the intermediate format (SIF)
    Dump(DumpArgs),
    /// Writes a subtitle stored in the intermediate format (SIF) as a subtitle file
    Load(LoadArgs),
    /// Shows some high level information about a subtitle file
    Info(InfoArgs),
}

impl Subcommands {
    pub fn run(self) -> anyhow::Result<()> {
        match self {
            Subcommands::Convert(args) => args.run(),
            Subcommands::Dump(args) => args.run(),
            Subcommands::Load(args) => args.run(),
            Subcommands::Info(args) => args.run(),
        }
    }
}

#[derive(Args, Debug)]
pub struct InputArgs {
    /// The subtitle file to read.
    ///
    /// If `-` is given, then it's interpreted as stdin.
    pub file: PathBuf,
    /// The format of the input, detected from its content if not given.
    #[arg(long, value_parser = parser_format)]
    pub from: Option<&'static str>,
    /// The encoding to try first when decoding the input.
    ///
    /// If it does not fit the data, the usual encodings are tried after it.
    #[arg(long, verbatim_doc_comment)]
    pub input_encoding: Option<String>,
    /// The frame rate for frame based formats such as MicroDVD.
    #[arg(long, value_parser = valid_fps)]
    pub fps: Option<f64>,
}

impl InputArgs {
    /// Reads and parses the input, logging every parse warning.
    fn load(&self) -> anyhow::Result<(SubtitleParser, Subtitle)> {
        let data = InputOutputLocation::new(self.file.clone()).read_bytes()?;
        let encoding = self.input_encoding.as_deref();
        let parser = match self.from {
            Some(format) => SubtitleParser::from_format(format)?.with_data(data, encoding),
            None => SubtitleParser::from_data(data, encoding)
                .with_context(|| format!("could not recognize {}", self.file.display()))?,
        };
        let mut parser = parser.with_options(ParseOptions { fps: self.fps });
        let subtitle = parser.parse()?;
        for warning in parser.warnings() {
            warn!("{}: {warning}", self.file.display());
        }
        Ok((parser, subtitle))
    }
}

#[derive(Args, Debug)]
pub struct OutputArgs {
    /// The format to write, inferred from the output file if not given.
    #[arg(long, value_parser = exporter_format)]
    pub to: Option<&'static str>,
    /// The encoding of the written file.
    ///
    /// Characters the encoding cannot represent are dropped.
    #[arg(long, default_value = "utf-8", verbatim_doc_comment)]
    pub encoding: String,
    /// Ends lines with CRLF instead of LF.
    #[arg(long)]
    pub crlf: bool,
    /// Where to output the file.
    ///
    /// If an output file is not provided then it defaults to creating
    /// a file in the current working directory with the same filename
    /// as the input file and the extension of the output format.
    ///
    /// If the output is being piped or `-` is given then it is printed
    /// into stdout instead.
    #[arg(short, long, verbatim_doc_comment)]
    pub output: Option<PathBuf>,
}

impl OutputArgs {
    /// Returns the exporter and where it should write to.
    ///
    /// If the command line arguments are invalid then this exits.
    fn resolve(self, input: &Path) -> anyhow::Result<(Exporter, InputOutputLocation)> {
        let format = match self.to {
            Some(format) => format,
            None => self
                .output
                .as_deref()
                .and_then(|path| path.extension())
                .and_then(|ext| ext.to_str())
                .and_then(|ext| exporter_format(ext).ok())
                .unwrap_or_else(|| {
                    Cli::command()
                        .error(
                            clap::error::ErrorKind::MissingRequiredArgument,
                            "could not determine output format for subtitle, use --to",
                        )
                        .exit()
                }),
        };

        let options = ExportOptions {
            encoding: self.encoding,
            line_ending: if self.crlf {
                LineEnding::CrLf
            } else {
                LineEnding::Lf
            },
        };
        let exporter = Exporter::from_format(format, options)?;
        let output = InputOutputLocation::resolve(self.output, input, extension_for(format));
        Ok((exporter, output))
    }
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    #[command(flatten)]
    pub input: InputArgs,
    #[command(flatten)]
    pub output: OutputArgs,
}

impl ConvertArgs {
    pub fn run(self) -> anyhow::Result<()> {
        let (parser, subtitle) = self.input.load()?;
        let (exporter, output) = self.output.resolve(&self.input.file)?;
        info!(
            "converting {} ({}) to {}",
            parser.format(),
            parser.encoding().unwrap_or("unknown"),
            exporter.format()
        );
        output.export(&exporter, &subtitle)
    }
}

#[derive(Args, Debug)]
pub struct DumpArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Writes times as plain seconds instead of `HH:MM:SS.sss`.
    #[arg(long)]
    pub numeric_time: bool,
    /// Escapes every non-ASCII character.
    #[arg(long)]
    pub ascii: bool,
    /// Where to output the SIF file, gzip compressed if it ends in `.gz`.
    ///
    /// The default follows the same rules as `convert`.
    #[arg(short, long, verbatim_doc_comment)]
    pub output: Option<PathBuf>,
}

impl DumpArgs {
    pub fn run(self) -> anyhow::Result<()> {
        let (_, subtitle) = self.input.load()?;
        let options = SaveOptions {
            human_time: !self.numeric_time,
            allow_unicode: !self.ascii,
        };
        match InputOutputLocation::resolve(self.output, &self.input.file, "sif") {
            InputOutputLocation::Path(path) => subtitle
                .save_to_path(&path, &options)
                .with_context(|| format!("could not write {}", path.display()))?,
            InputOutputLocation::Stdio => subtitle.save(stdout().lock(), &options)?,
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct LoadArgs {
    /// The SIF file to read, plain or gzip compressed.
    ///
    /// If `-` is given, then it's interpreted as stdin.
    pub file: PathBuf,
    /// Which document of a multi-document file to write, starting at 1.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub document: u32,
    #[command(flatten)]
    pub output: OutputArgs,
}

impl LoadArgs {
    fn read_documents(&self) -> anyhow::Result<Vec<Subtitle>> {
        let documents = match InputOutputLocation::new(self.file.clone()) {
            InputOutputLocation::Path(path) => Subtitle::open_multi(&path)?,
            stdio => {
                let data = stdio.read_bytes()?;
                if data.starts_with(&[0x1f, 0x8b]) {
                    Subtitle::from_reader_multi(MultiGzDecoder::new(&data[..]))?
                } else {
                    Subtitle::from_reader_multi(&data[..])?
                }
            }
        };
        Ok(documents)
    }

    pub fn run(self) -> anyhow::Result<()> {
        let documents = self
            .read_documents()
            .with_context(|| format!("could not load {}", self.file.display()))?;
        let Some(subtitle) = documents.get(self.document as usize - 1) else {
            anyhow::bail!(
                "{} has {} documents, cannot pick document {}",
                self.file.display(),
                documents.len(),
                self.document
            );
        };
        let (exporter, output) = self.output.resolve(&self.file)?;
        output.export(&exporter, subtitle)
    }
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

impl InfoArgs {
    pub fn run(self) -> anyhow::Result<()> {
        let (parser, subtitle) = self.input.load()?;
        println!("Format: {}", parser.format());
        println!("Encoding: {}", parser.encoding().unwrap_or("unknown"));
        println!("Dialogue:");
        println!("  Total: {}", subtitle.len());
        if let (Some(first), Some(last)) = (subtitle.iter().next(), subtitle.iter().last()) {
            println!("  From: {:.3}s", first.start);
            println!("  To: {:.3}s", last.end);
        }

        let overlaps = subtitle.check_overlaps();
        if !overlaps.is_empty() {
            println!("Overlaps:");
            for (first, second) in overlaps {
                println!("  #{} and #{}", first + 1, second + 1);
            }
        }

        if !parser.warnings().is_empty() {
            println!("Warnings:");
            for warning in parser.warnings() {
                println!("  {warning}");
            }
        }
        Ok(())
    }
}
