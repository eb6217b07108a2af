use crate::cli::SourceArgs;
use geograph_doctor::{DoctorError, DoctorOptions, run_doctor};
use std::path::PathBuf;

pub struct Args {
    pub sources: SourceArgs,
    pub strict: bool,
    pub explain: Option<String>,
    pub graph: Option<String>,
    pub snapshot: Option<String>,
    pub write: bool,
    pub fixed_out: String,
    pub suggest_split: Option<String>,
    pub k: usize,
    pub limit: Option<usize>,
    pub report_dir: String,
    pub json: bool,
}

pub fn run(args: Args) {
    let mut options = DoctorOptions::new(args.sources.to_paths());
    options.strict = args.strict;
    options.tolerant = args.sources.tolerant;
    options.previous_snapshot = args.snapshot.map(PathBuf::from);
    options.explain = args.explain;
    options.graph_out = args.graph.map(PathBuf::from);
    options.fixed_out = args.write.then(|| PathBuf::from(&args.fixed_out));
    options.suggest_split = args.suggest_split;
    options.split_k = args.k;
    options.limit = args.limit;
    options.report_dir = PathBuf::from(args.report_dir);

    let run = run_doctor(&options).unwrap_or_else(|error| {
        eprintln!("error: {error}");
        let code = match error {
            DoctorError::Render(_) => 2,
            DoctorError::Write(_) => 1,
        };
        std::process::exit(code);
    });

    if args.json {
        let rendered = run.report.to_json_string().unwrap_or_else(|error| {
            eprintln!("error: failed to render doctor payload: {error}");
            std::process::exit(2);
        });
        print!("{rendered}");
    } else {
        print!("{}", run.report.render_text());
        println!("  report: {}", run.report_text.display());
    }

    if !run.accepted() {
        std::process::exit(1);
    }
}
