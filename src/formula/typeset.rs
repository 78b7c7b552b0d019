//! Math typesetting
//!
//! `KatexTypesetter` validates the source through KaTeX (which also yields
//! MathML for the inline fallback) and linearises it into a `GlyphRun` that
//! the staging container measures and the capture draws. Sources that need a
//! two-dimensional layout are refused and fall back to the MathML.

use std::rc::Rc;

use log::debug;

use super::glyphs::{GlyphFont, GlyphRun, RunMetrics};
use super::request::DisplayMode;
use super::FormulaError;

/// Relative size of super- and subscripts.
const SCRIPT_SCALE: f32 = 0.7;
/// Superscript raise, in em.
const SUPERSCRIPT_SHIFT: f32 = 0.45;
/// Subscript drop, in em.
const SUBSCRIPT_SHIFT: f32 = -0.2;

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Whether the typesetter's measurements are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutSignal {
    /// Metrics come from the real font; no settle wait needed
    Complete,
    /// Metrics are provisional; wait for layout to settle
    Pending,
}

/// A formula typeset at a concrete font size.
#[derive(Debug, Clone)]
pub struct TypesetFormula {
    /// MathML produced by the engine
    pub markup: String,
    pub run: GlyphRun,
    pub metrics: RunMetrics,
    /// Font size the run was measured at, in CSS px
    pub font_size: f32,
    pub signal: LayoutSignal,
}

/// A math typesetting engine.
pub trait Typesetter {
    /// Typeset `source` at `font_size` CSS px.
    fn typeset(
        &self,
        source: &str,
        mode: DisplayMode,
        font_size: f32,
    ) -> Result<TypesetFormula, FormulaError>;

    /// Markup that renders the formula directly, without an image.
    fn render_inline_markup(&self, source: &str, mode: DisplayMode)
        -> Result<String, FormulaError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// KaTeX
// ─────────────────────────────────────────────────────────────────────────────

/// KaTeX-backed typesetter with optional real font metrics.
#[derive(Debug, Clone, Default)]
pub struct KatexTypesetter {
    font: Option<Rc<GlyphFont>>,
}

impl KatexTypesetter {
    pub fn new(font: Option<Rc<GlyphFont>>) -> Self {
        Self { font }
    }

    fn mathml(&self, source: &str, mode: DisplayMode) -> Result<String, FormulaError> {
        let opts = katex::Opts::builder()
            .display_mode(mode.is_block())
            .output_type(katex::OutputType::Mathml)
            .build()
            .map_err(|e| FormulaError::Typeset(e.to_string()))?;
        katex::render_with_opts(source, &opts).map_err(|e| FormulaError::Typeset(e.to_string()))
    }
}

impl Typesetter for KatexTypesetter {
    fn typeset(
        &self,
        source: &str,
        mode: DisplayMode,
        font_size: f32,
    ) -> Result<TypesetFormula, FormulaError> {
        let markup = self.mathml(source, mode)?;
        let run = linearize(source, mode)?;
        let font = self.font.as_deref();
        let metrics = run.measure(font, font_size);
        let signal = if font.is_some() {
            LayoutSignal::Complete
        } else {
            LayoutSignal::Pending
        };
        debug!(
            "Typeset {:?} at {}px: {:.1}x{:.1} ({:?})",
            source, font_size, metrics.width, metrics.height, signal
        );
        Ok(TypesetFormula {
            markup,
            run,
            metrics,
            font_size,
            signal,
        })
    }

    fn render_inline_markup(
        &self,
        source: &str,
        mode: DisplayMode,
    ) -> Result<String, FormulaError> {
        self.mathml(source, mode)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Linearisation
// ─────────────────────────────────────────────────────────────────────────────

/// Reduce TeX math to a single line of glyphs.
///
/// Only constructs a single line draws the same way KaTeX lays them out are
/// accepted: symbols, operators, Greek letters, super- and subscripts, text
/// groups, spacing and unstretched delimiters. Anything needing a
/// two-dimensional layout (fractions, roots, arrays, limits set above and
/// below an operator in display mode) or an unknown command is rejected with
/// [`FormulaError::Typeset`], so the formula falls back to its KaTeX markup
/// instead of being drawn wrong.
pub fn linearize(source: &str, mode: DisplayMode) -> Result<GlyphRun, FormulaError> {
    let mut parser = Parser {
        chars: source.chars().collect(),
        pos: 0,
        display: mode.is_block(),
        limits: false,
    };
    let run = parser.sequence(false)?;
    if parser.pos < parser.chars.len() {
        return Err(FormulaError::Typeset("unmatched '}'".to_string()));
    }
    Ok(run)
}

/// Operators whose scripts KaTeX stacks above and below in display style.
const LIMIT_OPERATORS: &[&str] = &[
    "sum", "prod", "coprod", "bigcup", "bigcap", "bigvee", "bigwedge", "bigoplus", "bigotimes",
    "lim", "limsup", "liminf", "max", "min", "sup", "inf", "det", "gcd", "Pr",
];

/// Upright operator names drawn as their letters.
const FUNCTION_NAMES: &[&str] = &[
    "sin", "cos", "tan", "sec", "csc", "cot", "arcsin", "arccos", "arctan", "sinh", "cosh",
    "tanh", "coth", "log", "ln", "lg", "exp", "ker", "dim", "deg", "arg", "hom", "lim", "limsup",
    "liminf", "max", "min", "sup", "inf", "det", "gcd", "Pr",
];

fn unsupported(what: &str) -> FormulaError {
    FormulaError::Typeset(format!("{} cannot be drawn as a single line", what))
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    display: bool,
    /// The last atom takes its scripts above and below
    limits: bool,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn skip_spaces(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    /// Parse atoms until end of input, or a closing brace when `in_group`.
    fn sequence(&mut self, in_group: bool) -> Result<GlyphRun, FormulaError> {
        let mut run = GlyphRun::new();
        loop {
            self.skip_spaces();
            match self.peek() {
                None if in_group => {
                    return Err(FormulaError::Typeset("unclosed '{'".to_string()))
                }
                None => return Ok(run),
                Some('}') if in_group => {
                    self.pos += 1;
                    return Ok(run);
                }
                Some('}') => return Ok(run),
                Some('^') | Some('_') => {
                    if self.limits {
                        return Err(unsupported("limits above or below an operator"));
                    }
                    let superscript = self.bump() == Some('^');
                    let script = self.atom()?;
                    self.limits = false;
                    let shift = if superscript {
                        SUPERSCRIPT_SHIFT
                    } else {
                        SUBSCRIPT_SHIFT
                    };
                    run.extend_scaled(&script, SCRIPT_SCALE, shift);
                }
                Some(_) => {
                    self.limits = false;
                    let atom = self.atom()?;
                    run.extend_scaled(&atom, 1.0, 0.0);
                }
            }
        }
    }

    /// One argument: a braced group, a command, or a single character.
    fn atom(&mut self) -> Result<GlyphRun, FormulaError> {
        self.skip_spaces();
        match self.bump() {
            None => Err(FormulaError::Typeset("missing argument".to_string())),
            Some('{') => {
                let group = self.sequence(true)?;
                self.limits = false;
                Ok(group)
            }
            Some('\\') => self.command(),
            Some('&') => Err(unsupported("alignment '&'")),
            Some('-') => Ok(single('\u{2212}')),
            Some('*') => Ok(single('\u{2217}')),
            Some('~') => Ok(single(' ')),
            Some('\'') => Ok(single('\u{2032}')),
            Some(ch) => Ok(single(ch)),
        }
    }

    fn command(&mut self) -> Result<GlyphRun, FormulaError> {
        let mut name = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphabetic() {
                name.push(ch);
                self.pos += 1;
            } else {
                break;
            }
        }
        if name.is_empty() {
            // Control symbol: \, \; \! \{ \} and friends
            return match self.bump() {
                Some(',') | Some(';') | Some(':') | Some(' ') => Ok(single(' ')),
                Some('!') => Ok(GlyphRun::new()),
                Some('\\') => Err(unsupported("line break '\\\\'")),
                Some(ch @ ('{' | '}' | '%' | '$' | '#' | '&' | '_' | '|')) => Ok(single(ch)),
                Some(ch) => Err(unsupported(&format!("'\\{}'", ch))),
                None => Err(FormulaError::Typeset("trailing backslash".to_string())),
            };
        }

        let name = name.as_str();
        match name {
            "text" | "textrm" | "textnormal" | "mbox" => self.text_group(),
            "mathrm" | "mathit" | "mathnormal" | "operatorname" => self.atom(),
            "left" | "right" => self.delimiter(),
            "displaystyle" | "textstyle" | "nolimits" => Ok(GlyphRun::new()),
            "limits" => {
                self.limits = true;
                Ok(GlyphRun::new())
            }
            "quad" | "qquad" => Ok(single(' ')),
            _ if FUNCTION_NAMES.contains(&name) => {
                self.limits = self.display && LIMIT_OPERATORS.contains(&name);
                let mut run = GlyphRun::new();
                for ch in name.chars() {
                    run.push(ch);
                }
                Ok(run)
            }
            _ => match symbol(name) {
                Some(ch) => {
                    self.limits = self.display && LIMIT_OPERATORS.contains(&name);
                    Ok(single(ch))
                }
                None => Err(unsupported(&format!("'\\{}'", name))),
            },
        }
    }

    /// The delimiter after `\left` or `\right`; `.` is invisible.
    fn delimiter(&mut self) -> Result<GlyphRun, FormulaError> {
        self.skip_spaces();
        match self.peek() {
            Some('.') => {
                self.pos += 1;
                Ok(GlyphRun::new())
            }
            Some('{') => Err(unsupported("a braced delimiter")),
            _ => self.atom(),
        }
    }

    /// Braced text where spaces are significant.
    fn text_group(&mut self) -> Result<GlyphRun, FormulaError> {
        self.skip_spaces();
        if self.peek() != Some('{') {
            return self.atom();
        }
        self.pos += 1;
        let mut run = GlyphRun::new();
        let mut depth = 0usize;
        while let Some(ch) = self.bump() {
            match ch {
                '{' => depth += 1,
                '}' if depth == 0 => return Ok(run),
                '}' => depth -= 1,
                '\\' | '$' => return Err(unsupported("markup inside text")),
                _ => run.push(ch),
            }
        }
        Err(FormulaError::Typeset("unclosed '{'".to_string()))
    }
}

fn single(ch: char) -> GlyphRun {
    let mut run = GlyphRun::new();
    run.push(ch);
    run
}

fn symbol(name: &str) -> Option<char> {
    let ch = match name {
        "alpha" => 'α',
        "beta" => 'β',
        "gamma" => 'γ',
        "delta" => 'δ',
        "epsilon" | "varepsilon" => 'ε',
        "zeta" => 'ζ',
        "eta" => 'η',
        "theta" | "vartheta" => 'θ',
        "iota" => 'ι',
        "kappa" => 'κ',
        "lambda" => 'λ',
        "mu" => 'μ',
        "nu" => 'ν',
        "xi" => 'ξ',
        "pi" => 'π',
        "rho" => 'ρ',
        "sigma" => 'σ',
        "tau" => 'τ',
        "upsilon" => 'υ',
        "phi" | "varphi" => 'φ',
        "chi" => 'χ',
        "psi" => 'ψ',
        "omega" => 'ω',
        "Gamma" => 'Γ',
        "Delta" => 'Δ',
        "Theta" => 'Θ',
        "Lambda" => 'Λ',
        "Xi" => 'Ξ',
        "Pi" => 'Π',
        "Sigma" => 'Σ',
        "Phi" => 'Φ',
        "Psi" => 'Ψ',
        "Omega" => 'Ω',
        "times" => '×',
        "cdot" => '·',
        "div" => '÷',
        "pm" => '±',
        "mp" => '∓',
        "leq" | "le" => '≤',
        "geq" | "ge" => '≥',
        "neq" | "ne" => '≠',
        "approx" => '≈',
        "equiv" => '≡',
        "sim" => '∼',
        "propto" => '∝',
        "infty" => '∞',
        "partial" => '∂',
        "nabla" => '∇',
        "sum" => '∑',
        "prod" => '∏',
        "coprod" => '∐',
        "bigcup" => '⋃',
        "bigcap" => '⋂',
        "bigvee" => '⋁',
        "bigwedge" => '⋀',
        "bigoplus" => '⨁',
        "bigotimes" => '⨂',
        "int" => '∫',
        "oint" => '∮',
        "in" => '∈',
        "notin" => '∉',
        "subset" => '⊂',
        "subseteq" => '⊆',
        "cup" => '∪',
        "cap" => '∩',
        "forall" => '∀',
        "exists" => '∃',
        "neg" | "lnot" => '¬',
        "land" | "wedge" => '∧',
        "lor" | "vee" => '∨',
        "to" | "rightarrow" => '→',
        "leftarrow" | "gets" => '←',
        "Rightarrow" | "implies" => '⇒',
        "Leftrightarrow" | "iff" => '⇔',
        "mapsto" => '↦',
        "ldots" | "dots" | "cdots" => '…',
        "prime" => '′',
        "circ" => '∘',
        "degree" => '°',
        "hbar" => 'ℏ',
        "ell" => 'ℓ',
        "emptyset" | "varnothing" => '∅',
        "langle" => '⟨',
        "rangle" => '⟩',
        "lbrace" => '{',
        "rbrace" => '}',
        _ => return None,
    };
    Some(ch)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
