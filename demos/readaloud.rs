use std::path::PathBuf;
use std::time::Instant;

use tts_highlight::{
    client::{Highlighter, Player, TokenAligner},
    config::{load_config, ReaderConfig},
    dom::Document,
    pipeline::SegmentPipeline,
    store::MemorySegmentStore,
    SynthesisParams, SynthesisResponse, SynthesisToken, Synthesizer,
};

/// Speaks every word for 250 ms and emits a silent tone.
struct MetronomeSynthesizer {
    sample_rate: u32,
}

impl Synthesizer for MetronomeSynthesizer {
    fn synthesize(
        &mut self,
        text: &str,
        _params: &SynthesisParams,
    ) -> Result<SynthesisResponse, Box<dyn std::error::Error>> {
        let mut tokens = Vec::new();
        let mut elapsed = 0.0;
        for word in text.split_whitespace() {
            let trimmed = word.trim_end_matches(|c: char| c.is_ascii_punctuation());
            if !trimmed.is_empty() {
                elapsed += 0.25;
                tokens.push(SynthesisToken {
                    orth: trimmed.to_string(),
                    endtime: elapsed,
                });
            }
            for punct in word[trimmed.len()..].chars() {
                tokens.push(SynthesisToken {
                    orth: punct.to_string(),
                    endtime: elapsed,
                });
            }
        }
        let samples = vec![0.0; (elapsed * self.sample_rate as f64) as usize];
        Ok(SynthesisResponse {
            tokens,
            samples,
            sample_rate: self.sample_rate,
        })
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => load_config(&PathBuf::from(path))?,
        None => ReaderConfig::default(),
    };
    let pipeline = SegmentPipeline::from_config(&config)?;

    let markup = "<h1>Chapter one</h1>\
                  <p>It was 6 p.m. when <b>Dylan</b> arrived. The room was quiet.</p>\
                  <table><tr><td>navigation</td></tr></table>\
                  <p>He sat by the window.</p>";
    let mut doc = Document::parse(markup);

    let mut store = MemorySegmentStore::new();
    let segment_start = Instant::now();
    let segments = pipeline.segments_for(&mut store, "rev-1", &doc, None);
    println!(
        "Cut {} segments in {:.2?}",
        segments.len(),
        segment_start.elapsed()
    );

    let mut synthesizer = MetronomeSynthesizer { sample_rate: 16000 };
    let params = SynthesisParams {
        language: "en".to_string(),
        voice: "default".to_string(),
    };

    let mut player = Player::new(
        segments.clone(),
        Highlighter::from_config(&config),
        TokenAligner::from_config(&config),
    );

    let mut next = Some(0);
    while let Some(index) = next {
        let response = synthesizer.synthesize_segment(&segments[index], &params)?;
        println!(
            "[{}] {:.2}s: {}",
            segments[index].hash.get(..8).unwrap_or_default(),
            response.duration_secs(),
            segments[index].text()
        );

        player.play(&mut doc, index);
        let mut advance = player.receive_synthesis(&mut doc, index, &response);
        while let Some(scheduled) = advance {
            println!("  {:>6.0?}  {}", scheduled.delay, doc.to_markup());
            advance = player.fire(&mut doc, scheduled);
        }
        next = player.ended(&mut doc);
    }

    assert_eq!(doc.to_markup(), Document::parse(markup).to_markup());
    println!("Document restored after playback");
    Ok(())
}
