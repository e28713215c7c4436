use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Anger,
    Contempt,
    Disgust,
    Fear,
    Happiness,
    Neutral,
    Sadness,
    Surprise,
    Unknown,
}

impl Emotion {
    pub const NAMED: [Emotion; 8] = [
        Emotion::Anger,
        Emotion::Contempt,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Happiness,
        Emotion::Neutral,
        Emotion::Sadness,
        Emotion::Surprise,
    ];

    /// Parse the analysis service's label; anything unrecognised is `Unknown`
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "anger" => Emotion::Anger,
            "contempt" => Emotion::Contempt,
            "disgust" => Emotion::Disgust,
            "fear" => Emotion::Fear,
            "happiness" => Emotion::Happiness,
            "neutral" => Emotion::Neutral,
            "sadness" => Emotion::Sadness,
            "surprise" => Emotion::Surprise,
            _ => Emotion::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Emotion::Anger => "anger",
            Emotion::Contempt => "contempt",
            Emotion::Disgust => "disgust",
            Emotion::Fear => "fear",
            Emotion::Happiness => "happiness",
            Emotion::Neutral => "neutral",
            Emotion::Sadness => "sadness",
            Emotion::Surprise => "surprise",
            Emotion::Unknown => "unknown",
        }
    }
}

/// Face attributes returned for one photo
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub dominant_emotion: Option<Emotion>,
}

impl AnalysisResult {
    /// Overlay lines for the photo, or `None` unless age, gender and
    /// emotion are all known
    pub fn overlay_lines(&self) -> Option<Vec<String>> {
        let age = self.age?;
        let gender = self.gender.as_deref()?;
        let emotion = self.dominant_emotion?;

        Some(vec![
            format!("Age: {}", age),
            format!("Gender: {}", capitalize(gender)),
            format!("Emotion: {}", capitalize(emotion.label())),
        ])
    }
}

/// Upper-case the first letter of every word, lower-case the rest
fn capitalize(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_label() {
        assert_eq!(Emotion::from_label("happiness"), Emotion::Happiness);
        assert_eq!(Emotion::from_label("Sadness "), Emotion::Sadness);
        assert_eq!(Emotion::from_label(""), Emotion::Unknown);
        assert_eq!(Emotion::from_label("boredom"), Emotion::Unknown);

        for emotion in Emotion::NAMED {
            assert_eq!(Emotion::from_label(emotion.label()), emotion);
        }
    }

    #[test]
    fn test_overlay_lines() {
        let result = AnalysisResult {
            age: Some(34),
            gender: Some("female".to_string()),
            dominant_emotion: Some(Emotion::Happiness),
        };

        assert_eq!(
            result.overlay_lines().unwrap(),
            vec!["Age: 34", "Gender: Female", "Emotion: Happiness"]
        );
    }

    #[test]
    fn test_overlay_lines_need_all_attributes() {
        let result = AnalysisResult {
            age: Some(34),
            gender: None,
            dominant_emotion: Some(Emotion::Neutral),
        };
        assert!(result.overlay_lines().is_none());
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("MALE"), "Male");
        assert_eq!(capitalize("non binary"), "Non Binary");
        assert_eq!(capitalize(""), "");
    }
}
