use dqskin::{CorSettings, Precompute, SkinData};
use std::path::PathBuf;

fn load_skin(path: &PathBuf, vertex_count: usize) -> SkinData {
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    if ext.eq_ignore_ascii_case("dqsk") {
        #[cfg(feature = "binary")]
        {
            let bytes = std::fs::read(path).expect("read skin");
            return SkinData::from_skin_bytes(&bytes, vertex_count).expect("parse skin");
        }
        #[cfg(not(feature = "binary"))]
        {
            panic!("Input is .dqsk but dqskin was built without feature `binary`.");
        }
    }

    let json = std::fs::read_to_string(path).expect("read json");
    SkinData::from_json_str(&json, vertex_count).expect("parse json")
}

fn main() {
    env_logger::init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut positional = Vec::<String>::new();
    let mut settings = CorSettings::default();

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--workers" => {
                if let Some(n) = args.get(i + 1).and_then(|s| s.parse().ok()) {
                    settings.worker_count = n;
                }
                i += 2;
            }
            "--threshold" => {
                if let Some(t) = args.get(i + 1).and_then(|s| s.parse().ok()) {
                    settings.weight_distance_threshold = t;
                }
                i += 2;
            }
            other => {
                positional.push(other.to_string());
                i += 1;
            }
        }
    }

    let Some(input) = positional.first().map(PathBuf::from) else {
        eprintln!("usage: precompute_dump <skin.json|skin.dqsk> <vertex-count> [out.json]");
        std::process::exit(2);
    };
    let vertex_count: usize = positional
        .get(1)
        .and_then(|s| s.parse().ok())
        .expect("vertex count");

    let skin = load_skin(&input, vertex_count);
    let (skin, report) = Precompute::new(settings).run(skin).expect("precompute");
    eprintln!(
        "{} clusters, {} fallbacks in {:?}",
        report.clusters, report.fallbacks, report.elapsed
    );

    let json = skin.to_json_string().expect("serialize");
    match positional.get(2) {
        Some(out) => std::fs::write(out, json).expect("write output"),
        None => println!("{json}"),
    }
}
