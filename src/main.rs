// SPDX-License-Identifier: Apache-2.0

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;

use icompress::consts::{DEFAULT_CI, DEFAULT_DEFLATE_LEVEL, DEFAULT_PCHUNK};
use icompress::structs::display;
use icompress::{
    Analyse, AnalysisDocument, ByteOrder, Compress, Dataset, ExitCode, F16, FloatType,
    ICompressError, MaskedArray, QuantiseMethod, ThresholdPolicy, VarData, Variable,
};

const HELP: &str = concat!(
    "icompress_util v",
    env!("CARGO_PKG_VERSION"),
    "

Analyse the information content of raw floating-point arrays and
quantise them so a lossless codec can compress them well.

USAGE:
  icompress_util analyse  [OPTIONS] <FILE>   analyse a raw array, write the analysis JSON
  icompress_util display  [OPTIONS] <FILE>   render an analysis JSON document
  icompress_util compress [OPTIONS] <FILE>   quantise a raw array using an analysis

ARRAY OPTIONS (analyse, compress):
  --dtype <NAME>        float16 | float32 | float64 [default: float32]
  --shape <N,N,...>     extents of the array dimensions (required)
  --order <C>           byte order of the file: < | > | = [default: =]
  --time-dim <N>        index of the dimension to treat as the time axis
  -v, --var <NAME>      variable name [default: data]

ANALYSE OPTIONS:
  -s, --tstart <N>      first timestep to analyse
  -e, --tend <N>        timestep to stop the analysis at
  -l, --level <N>       single level to analyse
  -x, --axis <N>        axis to pair samples along [default: 0]
  -t, --threads <N>     worker threads for the pair counts [default: 1]
  -o, --output <FILE>   analysis JSON output (stdout if omitted)

DISPLAY OPTIONS:
  -v, --var <NAME>      only display this variable
  -g, --group <NAME>    only display this group
  -r, --reverse         print bit positions highest first

COMPRESS OPTIONS:
  -a, --analysis <FILE> analysis JSON produced by analyse (required)
  -m, --method <NAME>   bitshave | bitgroom | bitset | bitmask [default: bitshave]
  -c, --ci <F>          fraction of information to retain [default: 0.99]
  -n, --nsb <N>         override the number of retained mantissa bits
  -P, --pchunk <N>      timesteps per processing chunk [default: 10000]
  -d, --deflate <N>     zlib level for the ratio report [default: 1]
  -I, --conv-int        narrow 64-bit integers to 32 bits on copied variables
  -F, --conv-float      narrow 64-bit floats to 32 bits on copied variables
  -f, --force           ignore a file-name mismatch against the analysis
  -o, --output <FILE>   quantised raw output (required)

COMMON:
  -D, --debug           verbose diagnostics
  -h, --help            this text
"
);

fn main() {
    match main_impl() {
        Ok(()) => {}
        Err(e) => {
            eprintln!("error: {:#}", e);
            let code = e
                .downcast_ref::<ICompressError>()
                .map(|ic| ic.exit_code.as_i32())
                .unwrap_or(ExitCode::AssertionFailure.as_i32());
            std::process::exit(code);
        }
    }
}

fn main_impl() -> Result<()> {
    let mut args = pico_args::Arguments::from_env();

    if args.contains(["-h", "--help"]) {
        print!("{}", HELP);
        return Ok(());
    }

    let debug = args.contains(["-D", "--debug"]);
    SimpleLogger::new()
        .with_level(if debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .init()?;

    match args.subcommand()?.as_deref() {
        Some("analyse") => run_analyse(args),
        Some("display") => run_display(args),
        Some("compress") => run_compress(args),
        Some(other) => Err(ICompressError::new(
            ExitCode::ConfigError,
            format!("unknown command: {}", other),
        )
        .into()),
        None => {
            print!("{}", HELP);
            Ok(())
        }
    }
}

/// Shape of the raw array a file holds, common to analyse and
/// compress.
struct RawLayout {
    dtype: FloatType,
    shape: Vec<usize>,
    order: ByteOrder,
    time_dim: Option<usize>,
    var_name: String,
}

impl RawLayout {
    fn from_args(args: &mut pico_args::Arguments) -> Result<Self> {
        let dtype_name: String = args
            .opt_value_from_str("--dtype")?
            .unwrap_or_else(|| "float32".to_string());
        let shape_text: String = args.value_from_str("--shape").context("--shape is required")?;
        let order_text: String = args
            .opt_value_from_str("--order")?
            .unwrap_or_else(|| "=".to_string());

        let mut shape = Vec::new();
        for part in shape_text.split(',') {
            match part.trim().parse::<usize>() {
                Ok(n) => shape.push(n),
                Err(_) => {
                    return Err(ICompressError::new(
                        ExitCode::ConfigError,
                        format!("bad shape: {}", shape_text),
                    )
                    .into())
                }
            }
        }

        let order = match order_text.chars().next() {
            Some(c) if order_text.chars().count() == 1 => ByteOrder::from_char(c)?,
            _ => {
                return Err(ICompressError::new(
                    ExitCode::ConfigError,
                    format!("bad byte order: {}", order_text),
                )
                .into())
            }
        };

        Ok(RawLayout {
            dtype: FloatType::from_name(&dtype_name)?,
            shape,
            order,
            time_dim: args.opt_value_from_str("--time-dim")?,
            var_name: args
                .opt_value_from_str(["-v", "--var"])?
                .unwrap_or_else(|| "data".to_string()),
        })
    }

    fn dimension_names(&self) -> Vec<String> {
        (0..self.shape.len())
            .map(|d| {
                if self.time_dim == Some(d) {
                    "time".to_string()
                } else {
                    format!("d{}", d)
                }
            })
            .collect()
    }
}

fn open_input(path: &Path) -> Result<BufReader<File>> {
    match File::open(path) {
        Ok(f) => Ok(BufReader::new(f)),
        Err(e) => Err(ICompressError::from(e)).context(format!("cannot open {}", path.display())),
    }
}

/// Read the raw array into a native-order variable; the declared byte
/// order is consumed here, so the in-memory array is always host
/// order.
fn read_raw_variable(path: &Path, layout: &RawLayout) -> Result<Variable> {
    let n: usize = layout.shape.iter().product();
    let mut reader = open_input(path)?;

    let data = if stored_big_endian(layout.order) {
        read_var_data::<BigEndian>(&mut reader, layout.dtype, n)?
    } else {
        read_var_data::<LittleEndian>(&mut reader, layout.dtype, n)?
    };

    // sanity: the file must not hold more data than the shape claims
    let mut probe = [0u8; 1];
    if reader.read(&mut probe)? != 0 {
        return Err(ICompressError::new(
            ExitCode::ConfigError,
            format!("{} holds more data than shape {:?}", path.display(), layout.shape),
        )
        .into());
    }

    let arr = match data {
        VarData::Float16(a) => VarData::Float16(reshape(a, &layout.shape)?),
        VarData::Float32(a) => VarData::Float32(reshape(a, &layout.shape)?),
        VarData::Float64(a) => VarData::Float64(reshape(a, &layout.shape)?),
        other => other,
    };

    Variable::new(layout.var_name.clone(), layout.dimension_names(), arr)
}

fn reshape<T: Copy>(flat: MaskedArray<T>, shape: &[usize]) -> Result<MaskedArray<T>> {
    MaskedArray::new(shape.to_vec(), flat.values().to_vec())
}

fn read_var_data<E: byteorder::ByteOrder>(
    reader: &mut impl Read,
    dtype: FloatType,
    n: usize,
) -> Result<VarData> {
    Ok(match dtype {
        FloatType::Float16 => {
            let mut raw = vec![0u16; n];
            reader.read_u16_into::<E>(&mut raw)?;
            let data: Vec<F16> = raw.into_iter().map(F16).collect();
            VarData::Float16(MaskedArray::new(vec![n], data)?)
        }
        FloatType::Float32 => {
            let mut data = vec![0f32; n];
            reader.read_f32_into::<E>(&mut data)?;
            VarData::Float32(MaskedArray::new(vec![n], data)?)
        }
        FloatType::Float64 => {
            let mut data = vec![0f64; n];
            reader.read_f64_into::<E>(&mut data)?;
            VarData::Float64(MaskedArray::new(vec![n], data)?)
        }
    })
}

fn stored_big_endian(order: ByteOrder) -> bool {
    match order {
        ByteOrder::Big => true,
        ByteOrder::Little => false,
        ByteOrder::Native | ByteOrder::NotApplicable => cfg!(target_endian = "big"),
    }
}

fn write_raw_variable(path: &Path, var: &Variable, order: ByteOrder) -> Result<()> {
    let file = File::create(path).map_err(ICompressError::from)?;
    let mut writer = BufWriter::new(file);

    if stored_big_endian(order) {
        write_var_data::<BigEndian>(&mut writer, &var.data)?;
    } else {
        write_var_data::<LittleEndian>(&mut writer, &var.data)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_var_data<E: byteorder::ByteOrder>(writer: &mut impl Write, data: &VarData) -> Result<()> {
    match data {
        VarData::Float16(a) => {
            for v in a.values() {
                writer.write_u16::<E>(v.0)?;
            }
        }
        VarData::Float32(a) => {
            for v in a.values() {
                writer.write_f32::<E>(*v)?;
            }
        }
        VarData::Float64(a) => {
            for v in a.values() {
                writer.write_f64::<E>(*v)?;
            }
        }
        VarData::Int32(a) => {
            for v in a.values() {
                writer.write_i32::<E>(*v)?;
            }
        }
        VarData::Int64(a) => {
            for v in a.values() {
                writer.write_i64::<E>(*v)?;
            }
        }
    }
    Ok(())
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn run_analyse(mut args: pico_args::Arguments) -> Result<()> {
    let layout = RawLayout::from_args(&mut args)?;
    let analyse = Analyse {
        time_start: args.opt_value_from_str(["-s", "--tstart"])?,
        time_end: args.opt_value_from_str(["-e", "--tend"])?,
        level: args.opt_value_from_str(["-l", "--level"])?,
        axis: args.opt_value_from_str(["-x", "--axis"])?.unwrap_or(0),
        workers: args.opt_value_from_str(["-t", "--threads"])?.unwrap_or(1),
    };
    let output: Option<PathBuf> = args.opt_value_from_str(["-o", "--output"])?;
    let input: PathBuf = args.free_from_str().context("input file is required")?;

    let input = absolute(&input);
    let var = read_raw_variable(&input, &layout)?;
    let mut dataset = Dataset::new(input.display().to_string());
    dataset.root.variables.push(var);

    let doc = analyse.from_dataset(&dataset, None, None)?;
    let text = doc.to_json()?;

    match output {
        Some(path) => {
            std::fs::write(&path, text).map_err(ICompressError::from)?;
            info!("analysis written to {}", path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}

fn load_analysis(path: &Path, input: &Path, force: bool) -> Result<AnalysisDocument> {
    let mut text = String::new();
    open_input(path)?.read_to_string(&mut text)?;
    let doc = AnalysisDocument::from_json(&text)?;
    doc.check_version()?;

    if doc.file != input.display().to_string() && !force {
        return Err(ICompressError::new(
            ExitCode::ConfigError,
            format!(
                "analysed file {} does not match file to be compressed {}",
                doc.file,
                input.display()
            ),
        )
        .into());
    }
    Ok(doc)
}

fn zlib_size(bytes: &[u8], level: u32) -> Result<usize> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?.len())
}

fn run_compress(mut args: pico_args::Arguments) -> Result<()> {
    let layout = RawLayout::from_args(&mut args)?;
    let analysis_path: PathBuf = args
        .value_from_str(["-a", "--analysis"])
        .context("--analysis is required")?;
    let method_name: String = args
        .opt_value_from_str(["-m", "--method"])?
        .unwrap_or_else(|| "bitshave".to_string());
    let ci: f64 = args.opt_value_from_str(["-c", "--ci"])?.unwrap_or(DEFAULT_CI);
    let nsb_override: Option<u32> = args.opt_value_from_str(["-n", "--nsb"])?;
    let pchunk: usize = args
        .opt_value_from_str(["-P", "--pchunk"])?
        .unwrap_or(DEFAULT_PCHUNK);
    let deflate: u32 = args
        .opt_value_from_str(["-d", "--deflate"])?
        .unwrap_or(DEFAULT_DEFLATE_LEVEL);
    let conv_int = args.contains(["-I", "--conv-int"]);
    let conv_float = args.contains(["-F", "--conv-float"]);
    let force = args.contains(["-f", "--force"]);
    let output: PathBuf = args
        .value_from_str(["-o", "--output"])
        .context("--output is required")?;
    let input: PathBuf = args.free_from_str().context("input file is required")?;

    // every configuration problem must surface before any processing
    let method = QuantiseMethod::parse(&method_name)?;
    let input = absolute(&input);
    if input == absolute(&output) {
        return Err(ICompressError::new(
            ExitCode::ConfigError,
            "input and output file are the same",
        )
        .into());
    }
    let mut analysis = load_analysis(&analysis_path, &input, force)?;

    if let Some(nsb) = nsb_override {
        for group in analysis.groups.values_mut() {
            for record in group.vars.values_mut() {
                record.retainbits = Some(nsb);
            }
        }
    }

    let var = read_raw_variable(&input, &layout)?;
    let mut dataset = Dataset::new(input.display().to_string());
    dataset.root.variables.push(var);

    let mut compress = Compress::new(analysis);
    compress.ci = ci;
    compress.method = method;
    compress.conv_int = conv_int;
    compress.conv_float = conv_float;
    compress.pchunk = pchunk;
    compress.policy = ThresholdPolicy::default();

    let result = compress.compress_dataset(&dataset)?;
    let out_var = match result.root.variable(&layout.var_name) {
        Some(v) => v,
        None => {
            return Err(ICompressError::new(
                ExitCode::InconsistentAnalysis,
                format!("variable {} missing from output", layout.var_name),
            )
            .into())
        }
    };
    write_raw_variable(&output, out_var, layout.order)?;

    if let Some(note) = out_var.attributes.get("compression") {
        info!("{}", note);
    }

    // make the gain observable: deflate both files at the chosen level
    let before = std::fs::read(&input).map_err(ICompressError::from)?;
    let after = std::fs::read(&output).map_err(ICompressError::from)?;
    let zin = zlib_size(&before, deflate)?;
    let zout = zlib_size(&after, deflate)?;
    info!(
        "zlib level {}: input {} -> {} bytes, quantised {} -> {} bytes ({:.1}% of input)",
        deflate,
        before.len(),
        zin,
        after.len(),
        zout,
        100.0 * zout as f64 / zin.max(1) as f64
    );

    Ok(())
}

fn run_display(mut args: pico_args::Arguments) -> Result<()> {
    let var_filter: Option<String> = args.opt_value_from_str(["-v", "--var"])?;
    let group_filter: Option<String> = args.opt_value_from_str(["-g", "--group"])?;
    let reverse = args.contains(["-r", "--reverse"]);
    let path: PathBuf = args.free_from_str().context("analysis file is required")?;

    let mut text = String::new();
    open_input(&path)?.read_to_string(&mut text)?;
    let doc = AnalysisDocument::from_json(&text)?;
    doc.check_version()?;

    println!("file name: {}", doc.file);
    let mut shown = false;
    for (group_name, group) in &doc.groups {
        if let Some(filter) = &group_filter {
            if filter != group_name {
                continue;
            }
        }
        println!("  group name: {}", group_name);
        for (var_name, record) in &group.vars {
            if let Some(filter) = &var_filter {
                if filter != var_name {
                    continue;
                }
            }
            println!("{}", display::format_variable(var_name, record, reverse));
            shown = true;
        }
    }
    if !shown {
        println!(
            "variable {} not found",
            var_filter.as_deref().unwrap_or("(any)")
        );
    }
    Ok(())
}
