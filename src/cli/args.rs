use clap::Parser;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "cerberus-pipelines", version, about = "Functional ontology assignments for metagenomes via HMM searching")]
pub struct Arguments {

    #[arg(short = 'm', long = "mic", help = "Microbial sequence (includes bacteriophage). May be repeated.")]
    pub mic: Vec<String>,

    #[arg(short = 'e', long = "euk", help = "Eukaryote sequence (includes other viruses). May be repeated.")]
    pub euk: Vec<String>,

    #[arg(short = 'c', long = "config", help = "Path to a KEY: value configuration file")]
    pub config: Option<String>,

    #[arg(short = 'o', long = "out", help = "Output directory for all generated files. Defaults to ./pipeline in the current working directory.")]
    pub out_dir: Option<String>,

    #[arg(long = "db-dir", help = "Directory holding FOAM-onto_rel1.tsv, KO_classification.txt and the HMM library")]
    pub db_dir: Option<String>,

    #[arg(long = "hmm", help = "HMM library for hmmsearch. Defaults to <db-dir>/FOAM-hmm_rel1a.hmm")]
    pub hmm: Option<String>,

    #[arg(long = "min-score", help = "Minimum hmmsearch score kept by the best-hit resolver [default: 25]")]
    pub min_score: Option<f64>,

    #[arg(short = 't', long, help = "CPUs handed to each external tool")]
    pub threads: Option<usize>,

    #[arg(short = 'w', long, help = "Work items run in parallel. Defaults to the physical core count.")]
    pub workers: Option<usize>,

    #[arg(long, default_value_t = false, help = "Recompute outputs that already exist")]
    pub replace: bool,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,
}
