//! Weighted lexicons for rule-based feedback analysis.
//!
//! All terms are stored accent-folded and lowercase, and are matched on
//! whole-token boundaries against [`MatchText`]. Spanish and English are
//! covered; multi-word phrases weigh twice as much as single keywords.
//! A sentiment term right after a negator ("no es bueno", "not bad")
//! counts for the opposite polarity.

use std::sync::LazyLock;

/// Weight of a single keyword hit.
pub const KEYWORD_WEIGHT: f32 = 1.0;
/// Weight of a multi-word phrase hit.
pub const PHRASE_WEIGHT: f32 = 2.0;

/// Tokens that invert the polarity of the term that follows them.
/// `t` is the tail of a tokenized "n't" contraction.
const NEGATORS: &[&str] = &["no", "not", "nunca", "never", "ni", "jamas", "t"];

/// Tokens allowed between a negator and the term it negates.
const NEGATION_FILLERS: &[&str] = &[
    "es", "esta", "estan", "son", "fue", "era", "muy", "tan", "nada", "is", "was", "are", "were",
    "be", "very", "so", "too", "that", "really", "at", "all",
];
const MAX_NEGATION_GAP: usize = 2;

const POSITIVE_TERMS: &[&str] = &[
    // Spanish
    "excelente", "bueno", "buena", "buen", "bien", "genial", "perfecto", "perfecta",
    "rapido", "rapida", "estable", "satisfecho", "satisfecha", "encanta", "recomiendo",
    "amable", "amables", "eficiente", "increible", "feliz", "gracias", "mejor",
    "fantastico", "maravilloso", "contento", "contenta",
    "muy bueno", "muy buena", "muy bien", "funciona bien", "funciona perfecto",
    "buen servicio", "excelente servicio", "lo recomiendo", "muy rapido", "sin problemas",
    "buena atencion", "vale la pena", "me gusta",
    // English
    "excellent", "good", "great", "awesome", "perfect", "fast", "reliable", "stable",
    "satisfied", "love", "recommend", "friendly", "helpful", "amazing", "happy",
    "thanks", "best",
    "works great", "works well", "very good", "great service", "no problems",
    "no issues", "highly recommend",
];

const NEGATIVE_TERMS: &[&str] = &[
    // Spanish
    "malo", "mala", "mal", "pesimo", "pesima", "terrible", "horrible", "lento", "lenta",
    "lentitud", "caro", "cara", "falla", "fallas", "problema", "problemas", "cortes",
    "caido", "caida", "nunca", "peor", "deficiente", "inestable", "molesto", "harto",
    "harta", "cancelar", "queja", "estafa", "abusivo", "intermitente",
    "no funciona", "no sirve", "muy lento", "muy malo", "muy mala", "mal servicio",
    "sin servicio", "sin internet", "se cae", "se corta", "no contestan", "no responden",
    "no me ayudaron", "mala atencion", "pesima atencion",
    // English
    "bad", "terrible", "awful", "horrible", "slow", "expensive", "broken", "problem",
    "issue", "outage", "worst", "never", "unstable", "annoying", "cancel", "scam",
    "useless", "disappointed", "rude",
    "doesn t work", "does not work", "not working", "very slow", "no service",
    "keeps dropping", "waste of money", "bad service",
];

/// Low-signal cues consulted only when the main lists tie.
const SUBTLE_POSITIVE_TERMS: &[&str] = &[
    "normal", "aceptable", "ok", "okay", "cumple", "decente", "correcto", "adecuado",
    "no esta mal", "fine", "decent", "acceptable", "not bad", "does the job",
];

const SUBTLE_NEGATIVE_TERMS: &[&str] = &[
    "regular", "mejorar", "deberia", "deberian", "a veces", "esperaba mas",
    "podria mejorar", "could be better", "should", "sometimes", "expected more",
    "needs improvement",
];

const EMOTION_TERMS: &[(&str, &[&str])] = &[
    (
        "satisfaction",
        &["satisfecho", "satisfecha", "contento", "contenta", "conforme", "cumple",
          "satisfied", "pleased", "content"],
    ),
    (
        "joy",
        &["feliz", "encanta", "genial", "excelente", "maravilloso", "fantastico",
          "happy", "love", "amazing", "awesome", "great"],
    ),
    (
        "gratitude",
        &["gracias", "agradezco", "agradecido", "agradecida", "thanks", "thank you", "grateful"],
    ),
    (
        "frustration",
        &["no funciona", "no sirve", "harto", "harta", "otra vez", "de nuevo", "frustrante",
          "frustrado", "frustrada", "frustrated", "frustrating", "not working",
          "doesn t work", "again", "fed up"],
    ),
    (
        "anger",
        &["pesimo", "pesima", "terrible", "horrible", "estafa", "abusivo", "indignante",
          "furioso", "furiosa", "molesto", "molesta", "verguenza", "angry", "furious",
          "outrageous", "scam", "worst", "ridiculous"],
    ),
    (
        "disappointment",
        &["decepcion", "decepcionado", "decepcionada", "esperaba", "lastima",
          "disappointed", "disappointing", "expected more", "let down"],
    ),
    (
        "worry",
        &["preocupa", "preocupado", "preocupada", "miedo", "no se si", "worried",
          "concerned", "afraid"],
    ),
    (
        "confusion",
        &["no entiendo", "confuso", "confusa", "no queda claro", "confusing", "confused",
          "unclear", "don t understand"],
    ),
];

/// Emotions that mark a negative verdict as strongly negative.
pub const HOSTILE_EMOTIONS: &[&str] = &["anger", "frustration"];

/// Emotions that push a synthetic NPS score towards promoter.
pub const WARM_EMOTIONS: &[&str] = &["joy", "satisfaction", "gratitude"];

/// Intensity contributed by each emotion cue, capped at 1.0.
pub const EMOTION_INTENSITY_STEP: f32 = 0.5;

/// `(name, critical, terms)`; critical pain points can escalate to P0.
const PAIN_POINT_TERMS: &[(&str, bool, &[&str])] = &[
    (
        "service_outage",
        true,
        &["no funciona", "sin servicio", "sin internet", "se cae", "caido", "caida", "cortes",
          "no sirve", "outage", "no service", "not working", "doesn t work", "does not work",
          "no connection", "sin conexion"],
    ),
    (
        "billing_error",
        true,
        &["cobro indebido", "cobraron de mas", "doble cobro", "cobro doble", "me cobraron",
          "estafa", "overcharged", "double charged", "wrong charge", "scam"],
    ),
    (
        "slow_speed",
        false,
        &["lento", "lenta", "lentitud", "baja velocidad", "slow", "lag", "low speed"],
    ),
    (
        "poor_support",
        false,
        &["no contestan", "no responden", "no me ayudaron", "mala atencion", "pesima atencion",
          "nadie responde", "no one answers", "no response", "bad support", "rude"],
    ),
    (
        "high_price",
        false,
        &["caro", "cara", "costoso", "costosa", "precio alto", "expensive", "overpriced"],
    ),
    (
        "installation_delay",
        false,
        &["no han venido", "no vinieron", "retraso", "demora", "delay", "delayed",
          "still waiting"],
    ),
    (
        "intermittent_connection",
        false,
        &["intermitente", "se corta", "se desconecta", "inestable", "intermittent",
          "keeps dropping", "unstable", "disconnects"],
    ),
];

const THEME_TERMS: &[(&str, &[&str])] = &[
    (
        "connectivity",
        &["internet", "conexion", "senal", "wifi", "red", "conectividad", "connection",
          "signal", "network", "se cae", "se corta"],
    ),
    (
        "speed",
        &["velocidad", "lento", "lenta", "lentitud", "rapido", "rapida", "megas", "speed",
          "slow", "fast", "bandwidth"],
    ),
    (
        "billing",
        &["factura", "cobro", "cobraron", "pago", "recibo", "facturacion", "bill", "billing",
          "charge", "charged", "invoice", "payment"],
    ),
    (
        "customer_service",
        &["atencion", "soporte", "servicio al cliente", "asesor", "agente", "call center",
          "support", "agent", "representative", "customer service"],
    ),
    (
        "pricing",
        &["precio", "caro", "cara", "barato", "tarifa", "costo", "price", "expensive",
          "cheap", "cost"],
    ),
    (
        "installation",
        &["instalacion", "instalar", "visita", "tecnico", "installation", "install",
          "technician", "setup"],
    ),
    ("coverage", &["cobertura", "zona", "coverage", "area"]),
    (
        "product_quality",
        &["calidad", "equipo", "router", "modem", "quality", "device", "equipment"],
    ),
];

const CHURN_HIGH_TERMS: &[&str] = &[
    "cancelar", "dar de baja", "me voy", "cambiarme", "me cambio", "cambiar de compania",
    "cambiar de proveedor", "otra compania", "competencia", "cancel", "switch provider",
    "switching", "leaving", "terminate",
];

const CHURN_MEDIUM_TERMS: &[&str] = &[
    "harto", "harta", "ultima vez", "no vuelvo", "pensando en", "decepcionado",
    "decepcionada", "otra vez", "de nuevo", "fed up", "last time", "considering", "again",
    "disappointed",
];

/// Replaces accented latin letters with their base letter.
pub fn fold_accents(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' | 'ã' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            'Á' | 'À' | 'Ä' | 'Â' | 'Ã' => 'A',
            'É' | 'È' | 'Ë' | 'Ê' => 'E',
            'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
            'Ó' | 'Ò' | 'Ö' | 'Ô' | 'Õ' => 'O',
            'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
            'Ñ' => 'N',
            'Ç' => 'C',
            other => other,
        })
        .collect()
}

/// Lowercased, accent-folded tokens joined by single spaces and padded on
/// both ends, so `" term "` lookups only hit whole tokens.
#[derive(Debug, Clone)]
pub struct MatchText {
    padded: String,
    tokens: Vec<String>,
}

impl MatchText {
    pub fn new(text: &str) -> Self {
        let folded = fold_accents(&text.to_lowercase());
        let tokens: Vec<&str> = folded
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        Self {
            padded: format!(" {} ", tokens.join(" ")),
            tokens: tokens.into_iter().map(str::to_string).collect(),
        }
    }

    /// Number of non-overlapping occurrences of an already padded term.
    fn occurrences(&self, padded_term: &str) -> usize {
        // Tokens are space separated, so consecutive hits share a space;
        // step over the term minus its trailing pad.
        let step = padded_term.len().saturating_sub(1).max(1);
        let mut count = 0;
        let mut from = 0;
        while let Some(pos) = self.padded[from..].find(padded_term) {
            count += 1;
            from += pos + step;
        }
        count
    }

    /// Token offsets of the non-overlapping occurrences of `term`.
    fn positions(&self, term: &[String]) -> Vec<usize> {
        let mut found = Vec::new();
        if term.is_empty() {
            return found;
        }
        let mut i = 0;
        while i + term.len() <= self.tokens.len() {
            if self.tokens[i..i + term.len()] == *term {
                found.push(i);
                i += term.len();
            } else {
                i += 1;
            }
        }
        found
    }

    /// True when the token run ending before `index` is a negator,
    /// possibly followed by up to [`MAX_NEGATION_GAP`] filler tokens.
    fn is_negated_at(&self, index: usize) -> bool {
        let mut k = index;
        let mut gap = 0;
        while k > 0 && gap < MAX_NEGATION_GAP && NEGATION_FILLERS.contains(&self.tokens[k - 1].as_str()) {
            k -= 1;
            gap += 1;
        }
        k > 0 && NEGATORS.contains(&self.tokens[k - 1].as_str())
    }
}

/// One lexicon entry, pre-tokenized the same way as [`MatchText`].
#[derive(Debug, Clone)]
pub struct Term {
    padded: String,
    tokens: Vec<String>,
    pub weight: f32,
}

impl Term {
    fn new(raw: &str) -> Self {
        let MatchText { padded, tokens } = MatchText::new(raw);
        let weight = if tokens.len() > 1 { PHRASE_WEIGHT } else { KEYWORD_WEIGHT };
        Self {
            padded,
            tokens,
            weight,
        }
    }
}

/// A list of terms with hit counting helpers.
#[derive(Debug, Clone)]
pub struct TermSet {
    terms: Vec<Term>,
}

impl TermSet {
    fn new(raw: &[&str]) -> Self {
        Self {
            terms: raw.iter().map(|t| Term::new(t)).collect(),
        }
    }

    /// Sum of weights of every hit.
    pub fn weighted_hits(&self, text: &MatchText) -> f32 {
        self.terms
            .iter()
            .map(|term| term.weight * text.occurrences(&term.padded) as f32)
            .sum()
    }

    /// Weighted hits split into `(plain, negated)`.
    pub fn polarity_hits(&self, text: &MatchText) -> (f32, f32) {
        let mut plain = 0.0;
        let mut negated = 0.0;
        for term in &self.terms {
            for index in text.positions(&term.tokens) {
                if text.is_negated_at(index) {
                    negated += term.weight;
                } else {
                    plain += term.weight;
                }
            }
        }
        (plain, negated)
    }

    /// Number of distinct terms present.
    pub fn distinct_hits(&self, text: &MatchText) -> usize {
        self.terms
            .iter()
            .filter(|term| text.occurrences(&term.padded) > 0)
            .count()
    }

    pub fn any(&self, text: &MatchText) -> bool {
        self.terms.iter().any(|term| text.occurrences(&term.padded) > 0)
    }
}

/// A named category (theme, emotion, pain point) with its cue terms.
#[derive(Debug, Clone)]
pub struct Category {
    pub name: &'static str,
    pub critical: bool,
    pub terms: TermSet,
}

/// Every lexicon the rule analyzer and the scoring rubrics use.
#[derive(Debug)]
pub struct Lexicon {
    pub positive: TermSet,
    pub negative: TermSet,
    pub subtle_positive: TermSet,
    pub subtle_negative: TermSet,
    pub emotions: Vec<Category>,
    pub pain_points: Vec<Category>,
    pub themes: Vec<Category>,
    pub churn_high: TermSet,
    pub churn_medium: TermSet,
}

fn categories(entries: &[(&'static str, &[&str])]) -> Vec<Category> {
    entries
        .iter()
        .map(|(name, terms)| Category {
            name: *name,
            critical: false,
            terms: TermSet::new(terms),
        })
        .collect()
}

impl Lexicon {
    fn build() -> Self {
        Self {
            positive: TermSet::new(POSITIVE_TERMS),
            negative: TermSet::new(NEGATIVE_TERMS),
            subtle_positive: TermSet::new(SUBTLE_POSITIVE_TERMS),
            subtle_negative: TermSet::new(SUBTLE_NEGATIVE_TERMS),
            emotions: categories(EMOTION_TERMS),
            pain_points: PAIN_POINT_TERMS
                .iter()
                .map(|(name, critical, terms)| Category {
                    name: *name,
                    critical: *critical,
                    terms: TermSet::new(terms),
                })
                .collect(),
            themes: categories(THEME_TERMS),
            churn_high: TermSet::new(CHURN_HIGH_TERMS),
            churn_medium: TermSet::new(CHURN_MEDIUM_TERMS),
        }
    }

    /// True for a critical category name, or free text naming a critical problem.
    pub fn is_critical_pain_point(&self, pain_point: &str) -> bool {
        let text = MatchText::new(pain_point);
        self.pain_points
            .iter()
            .filter(|category| category.critical)
            .any(|category| category.name == pain_point || category.terms.any(&text))
    }
}

// Built once; the term tables are compile-time constants.
pub static LEXICON: LazyLock<Lexicon> = LazyLock::new(Lexicon::build);
