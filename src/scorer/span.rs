use ndarray::Array2;
use regex::Regex;

/// Half-open match span `[start, end)` in byte offsets, with its length in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub chars: usize,
}

impl Span {
    #[inline]
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start.max(other.start) < self.end.min(other.end)
    }
}

/// All whole-word matches of one keyword.
/// The search restarts one character after each match start, so repeated
/// occurrences that share characters are all reported.
pub fn find_spans(matcher: &Regex, text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut pos = 0;
    while pos <= text.len() {
        let Some(m) = matcher.find_at(text, pos) else { break };
        spans.push(Span {
            start: m.start(),
            end: m.end(),
            chars: m.as_str().chars().count(),
        });
        let step = text[m.start()..].chars().next().map_or(1, |c| c.len_utf8());
        pos = m.start() + step;
    }
    spans
}

/// Drop spans shadowed by a longer overlapping keyword.
///
/// `spans[i]` holds the matches of word `i`. For every word `i` with matches and
/// every `j` flagged in `overlap[i][j]` that also has matches, each overlapping
/// pair of spans loses its shorter member. On equal length the span of `i`
/// survives.
pub fn resolve_overlaps(spans: &mut [Vec<Span>], overlap: &Array2<f64>) {
    let occurring: Vec<usize> = (0..spans.len()).filter(|&i| !spans[i].is_empty()).collect();
    for i in occurring {
        for (j, flag) in overlap.row(i).iter().enumerate() {
            if *flag == 0.0 || i == j || spans[j].is_empty() || spans[i].is_empty() {
                continue;
            }
            let mut a = std::mem::take(&mut spans[i]);
            let mut b = std::mem::take(&mut spans[j]);
            drop_shadowed(&mut a, &mut b);
            spans[i] = a;
            spans[j] = b;
        }
    }
}

fn drop_shadowed(a: &mut Vec<Span>, b: &mut Vec<Span>) {
    let mut drop_a = vec![false; a.len()];
    let mut drop_b = vec![false; b.len()];
    for (x, p1) in a.iter().enumerate() {
        for (y, p2) in b.iter().enumerate() {
            if p1.overlaps(p2) {
                if p1.chars < p2.chars {
                    drop_a[x] = true;
                } else {
                    drop_b[y] = true;
                }
            }
        }
    }
    let mut keep = drop_a.iter().map(|d| !d);
    a.retain(|_| keep.next().unwrap_or(true));
    let mut keep = drop_b.iter().map(|d| !d);
    b.retain(|_| keep.next().unwrap_or(true));
}
