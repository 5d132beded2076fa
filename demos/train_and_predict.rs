use std::collections::HashMap;

use anyhow::Result;
use tokenizers::models::wordlevel::WordLevel;
use tokenizers::pre_tokenizers::whitespace::Whitespace;
use tokenizers::{AddedToken, Tokenizer};

use proctune::utils::{setup_logging, LogConfig};
use proctune::{
    PatientRecord, PromptTemplate, SimulatedBackend, TokenizerAdapter, TunerConfig,
    TunerPipeline,
};

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging(LogConfig::default()).map_err(anyhow::Error::msg)?;

    // Optional CSV path; falls back to a small built-in dataset
    let args: Vec<String> = std::env::args().collect();
    let mut config = TunerConfig::instruction_style();
    let records = if let Some(path) = args.get(1) {
        config.data.csv_path = path.into();
        proctune::load_records(path)?
    } else {
        config.data.csv_path = "builtin".into();
        sample_records()
    };

    // Demo tokenizer: a whitespace word-level vocabulary built from the
    // dataset itself. A real run loads the model's tokenizer.json instead.
    let template = PromptTemplate::new(config.tokenizer.prompt_style);
    let corpus: Vec<String> = records.iter().map(|r| template.render(r)).collect();
    let (tokenizer, vocab) = build_tokenizer(&corpus);
    let adapter = TokenizerAdapter::new(tokenizer, &config.tokenizer)
        .map_err(anyhow::Error::from)?;

    // Scripted backend standing in for the fine-tuned model
    let continuation: Vec<u32> = ["coronary", "angiography"]
        .iter()
        .filter_map(|word| vocab.get(*word).copied())
        .collect();
    let backend = SimulatedBackend::new(continuation);

    let pipeline = TunerPipeline::builder()
        .with_config(config)
        .with_tokenizer(adapter)
        .with_backend(Box::new(backend))
        .build()?;

    let report = pipeline.train(records).await?;
    println!(
        "Trained {} epochs over {} train / {} eval batches",
        report.epochs_completed, report.train_batches, report.eval_batches
    );

    let query = PatientRecord {
        age: 55,
        gender: "Female".to_string(),
        symptoms: "chest pain, shortness of breath".to_string(),
        diagnoses: "hypertension, coronary artery disease".to_string(),
        procedures: String::new(),
    };

    let predicted = pipeline.predict(&query).await?;
    println!("Predicted Procedure: {}", predicted);

    pipeline.persist_run_metadata("run_metadata.json")?;
    println!(
        "Run metadata saved (trained width: {:?})",
        pipeline.run_metadata().trained_length
    );

    Ok(())
}

fn sample_records() -> Vec<PatientRecord> {
    let rows = [
        (55, "Female", "chest pain, shortness of breath", "hypertension, coronary artery disease", "coronary angiography"),
        (62, "Male", "fatigue, pallor", "iron deficiency anemia", "iron infusion"),
        (47, "Female", "joint pain, stiffness", "rheumatoid arthritis", "methotrexate initiation"),
        (71, "Male", "chest pain, dizziness", "aortic stenosis", "valve replacement"),
        (39, "Female", "abdominal pain, nausea", "cholelithiasis", "laparoscopic cholecystectomy"),
        (58, "Male", "shortness of breath, wheezing", "chronic obstructive pulmonary disease", "pulmonary rehabilitation"),
        (66, "Female", "palpitations, syncope", "atrial fibrillation", "catheter ablation"),
        (50, "Male", "back pain, leg numbness", "lumbar disc herniation", "microdiscectomy"),
        (44, "Female", "headache, blurred vision", "migraine with aura", "triptan therapy"),
        (69, "Male", "urinary retention", "benign prostatic hyperplasia", "transurethral resection"),
    ];

    rows.iter()
        .map(|&(age, gender, symptoms, diagnoses, procedures)| PatientRecord {
            age,
            gender: gender.to_string(),
            symptoms: symptoms.to_string(),
            diagnoses: diagnoses.to_string(),
            procedures: procedures.to_string(),
        })
        .collect()
}

fn build_tokenizer(corpus: &[String]) -> (Tokenizer, HashMap<String, u32>) {
    let mut vocab: HashMap<String, u32> = HashMap::new();
    vocab.insert("[UNK]".to_string(), 0);
    vocab.insert("</s>".to_string(), 1);
    for text in corpus {
        for word in text.split_whitespace() {
            let next_id = vocab.len() as u32;
            vocab.entry(word.to_string()).or_insert(next_id);
        }
    }

    let model = WordLevel::builder()
        .vocab(vocab.clone())
        .unk_token("[UNK]".to_string())
        .build()
        .expect("word-level vocabulary");

    let mut tokenizer = Tokenizer::new(model);
    tokenizer.with_pre_tokenizer(Some(Whitespace {}));
    tokenizer.add_special_tokens(&[AddedToken::from("</s>", true)]);

    (tokenizer, vocab)
}
