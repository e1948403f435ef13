use std::sync::Arc;

/// Token level transform supplied by the caller (lemmatizer or stemmer).
///
/// The crate does not ship linguistic models; plug an implementation in
/// through `DictionaryOptions` so the dictionary is normalized the same way the
/// documents were cleaned.
pub trait TokenTransform: Send + Sync {
    fn transform(&self, token: &str) -> String;
}

impl<F> TokenTransform for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn transform(&self, token: &str) -> String {
        self(token)
    }
}

/// separators joined into a single space before tokenizing
const SEPARATORS: [&str; 4] = ["_", "-", " & ", "/"];

/// whole-token contractions that the suffix rules below get wrong
const SPECIAL_CONTRACTIONS: [(&str, &str); 12] = [
    ("can't", "can not"),
    ("cannot", "can not"),
    ("won't", "will not"),
    ("shan't", "shall not"),
    ("ain't", "is not"),
    ("let's", "let us"),
    ("it's", "it is"),
    ("that's", "that is"),
    ("what's", "what is"),
    ("there's", "there is"),
    ("he's", "he is"),
    ("she's", "she is"),
];

const SUFFIX_CONTRACTIONS: [(&str, &str); 6] = [
    ("n't", " not"),
    ("'re", " are"),
    ("'ll", " will"),
    ("'ve", " have"),
    ("'m", " am"),
    ("'d", " would"),
];

/// Expand English contractions token by token.
/// Possessive `'s` is dropped ("trump's" -> "trump").
pub fn expand_contractions(text: &str) -> String {
    let text = text.replace('\u{2019}', "'");
    let mut out: Vec<String> = Vec::new();
    for token in text.split_whitespace() {
        if let Some((_, full)) = SPECIAL_CONTRACTIONS.iter().find(|(c, _)| *c == token) {
            out.push(full.to_string());
            continue;
        }
        if let Some((suffix, full)) = SUFFIX_CONTRACTIONS.iter().find(|(s, _)| token.ends_with(s)) {
            let stem = &token[..token.len() - suffix.len()];
            if !stem.is_empty() {
                out.push(format!("{stem}{full}"));
                continue;
            }
        }
        if let Some(stem) = token.strip_suffix("'s") {
            if !stem.is_empty() {
                out.push(stem.to_string());
                continue;
            }
        }
        out.push(token.to_string());
    }
    out.join(" ")
}

/// Normalization settings for dictionary keywords.
#[derive(Clone, Default)]
pub struct WordNormalizer {
    pub lemmatizer: Option<Arc<dyn TokenTransform>>,
    pub stemmer: Option<Arc<dyn TokenTransform>>,
}

impl std::fmt::Debug for WordNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordNormalizer")
            .field("lemmatize", &self.lemmatizer.is_some())
            .field("stem", &self.stemmer.is_some())
            .finish()
    }
}

impl WordNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a raw keyword into its canonical form.
    ///
    /// # Returns
    /// * `(String, usize)` - the normalized phrase and its token count
    pub fn normalize(&self, raw: &str) -> (String, usize) {
        let mut word = raw.to_lowercase().trim().to_string();
        for sep in SEPARATORS {
            word = word.replace(sep, " ");
        }
        let word = expand_contractions(&word);
        let tokens: Vec<&str> = word.split_whitespace().collect();

        // lemmatize wins when both are requested
        let transform = self.lemmatizer.as_ref().or(self.stemmer.as_ref());
        let tokens: Vec<String> = match transform {
            Some(t) => tokens.iter().map(|tok| t.transform(tok)).collect(),
            None => tokens.iter().map(|tok| tok.to_string()).collect(),
        };
        let n_tokens = tokens.len();
        (tokens.join(" "), n_tokens)
    }
}
