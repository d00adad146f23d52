//! Rule-based elective recommendations from a free-text background.

use std::collections::BTreeMap;

use crate::program::{Course, CourseKind, ProgramId};
use crate::snapshot::ProgramSnapshot;

/// Default number of recommendations returned.
pub const DEFAULT_MAX_RECOMMENDATIONS: usize = 5;
/// Semesters covered by the study plan.
pub const PLAN_SEMESTERS: u8 = 4;

const MEDALS: [&str; 5] = ["🥇", "🥈", "🥉", "4️⃣", "5️⃣"];
const HIGH_VALUE_KEYWORDS: &[&str] = &[
    "deep learning",
    "глубокое",
    "nlp",
    "computer vision",
    "mlops",
    "transformer",
    "llm",
    "генеративн",
];

/// Self-reported proficiency, ordered from none to advanced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum SkillLevel {
    /// No exposure.
    #[default]
    None,
    /// Some exposure.
    Beginner,
    /// Working knowledge.
    Intermediate,
    /// Expert.
    Advanced,
}

impl SkillLevel {
    fn is_solid(self) -> bool {
        self >= Self::Intermediate
    }
}

/// Skill profile inferred from background text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct UserSkills {
    pub python: SkillLevel,
    pub math: SkillLevel,
    pub statistics: SkillLevel,
    pub ml: SkillLevel,
    pub deep_learning: SkillLevel,
    pub nlp: SkillLevel,
    pub computer_vision: SkillLevel,
    pub mlops: SkillLevel,
}

fn mentions(text: &str, words: &[&str]) -> bool {
    words.iter().any(|word| text.contains(word))
}

impl UserSkills {
    /// Keyword heuristics over the user's own description.
    pub fn from_background(background: &str) -> Self {
        let text = background.to_lowercase();
        let has = |words: &[&str]| mentions(&text, words);
        let mut skills = Self::default();

        if has(&["python", "питон", "программирован"]) {
            skills.python = SkillLevel::Intermediate;
        }
        if has(&["senior", "lead"]) {
            skills.python = SkillLevel::Advanced;
        }
        if has(&["математик", "math", "физик", "мехмат"]) {
            skills.math = SkillLevel::Advanced;
            skills.statistics = SkillLevel::Intermediate;
        }
        if has(&["ml", "machine learning", "машинн"]) {
            skills.ml = SkillLevel::Intermediate;
        }
        if has(&["data scien", "ds", "аналитик данных"]) {
            skills.ml = SkillLevel::Intermediate;
            skills.statistics = SkillLevel::Intermediate;
        }
        if has(&["deep learning", "нейронн", "pytorch", "tensorflow"]) {
            skills.deep_learning = SkillLevel::Intermediate;
        }
        if has(&["nlp", "нлп", "обработка текст", "natural language"]) {
            skills.nlp = SkillLevel::Intermediate;
        }
        if has(&["computer vision", "cv", "компьютерн зрен", "opencv"]) {
            skills.computer_vision = SkillLevel::Intermediate;
        }
        if has(&["mlops", "devops", "docker", "kubernetes", "deploy"]) {
            skills.mlops = SkillLevel::Intermediate;
        }
        skills
    }

    /// Fraction of `prerequisites` the user already covers; 1.0 when none.
    fn readiness(&self, prerequisites: &[String]) -> f32 {
        if prerequisites.is_empty() {
            return 1.0;
        }
        let met = prerequisites
            .iter()
            .filter(|prereq| {
                let prereq = prereq.to_lowercase();
                if prereq.contains("python") {
                    self.python.is_solid()
                } else if mentions(&prereq, &["машинн", "ml"]) {
                    self.ml.is_solid()
                } else if mentions(&prereq, &["глубок", "deep"]) {
                    self.deep_learning.is_solid()
                } else if mentions(&prereq, &["статист", "вероятн"]) {
                    self.statistics.is_solid()
                } else if mentions(&prereq, &["алгебр", "math"]) {
                    self.math.is_solid()
                } else {
                    false
                }
            })
            .count();
        met as f32 / prerequisites.len() as f32
    }

    /// How many new areas the course opens up, scaled to [0, 1].
    fn growth(&self, skills_gained: &[String]) -> f32 {
        if skills_gained.is_empty() {
            return 0.5;
        }
        let text = skills_gained.join(" ").to_lowercase();
        let areas = [
            (mentions(&text, &["nlp", "text"]), self.nlp),
            (mentions(&text, &["cv", "vision", "image"]), self.computer_vision),
            (mentions(&text, &["pytorch", "нейрон"]), self.deep_learning),
            (mentions(&text, &["docker", "deploy"]), self.mlops),
        ];
        let new_skills = areas
            .iter()
            .filter(|(taught, level)| *taught && *level <= SkillLevel::Beginner)
            .count();
        (new_skills as f32 / 2.0).min(1.0)
    }
}

fn career_value(course: &Course) -> f32 {
    let text = format!("{} {}", course.name, course.description).to_lowercase();
    let matches = HIGH_VALUE_KEYWORDS
        .iter()
        .filter(|keyword| text.contains(*keyword))
        .count();
    (matches as f32 / 3.0).min(1.0)
}

/// A scored course suggestion.
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    /// Suggested course.
    pub course: Course,
    /// Weighted score in [0, 1].
    pub score: f32,
    /// Human-readable reasons, joined with `; `.
    pub reasoning: String,
    /// 1 is the strongest suggestion.
    pub priority: usize,
}

/// Ranks elective courses against a user's background and interests.
#[derive(Debug, Clone, Default)]
pub struct Recommender {
    courses: Vec<Course>,
}

impl Recommender {
    /// Recommender over an explicit course list.
    pub fn new(courses: Vec<Course>) -> Self {
        Self { courses }
    }

    /// Recommender over every course found in the snapshots.
    pub fn from_snapshots(snapshots: &[ProgramSnapshot]) -> Self {
        Self::new(
            snapshots
                .iter()
                .flat_map(|snapshot| snapshot.profile.courses.iter().cloned())
                .collect(),
        )
    }

    /// Elective courses, optionally for one program.
    pub fn electives(&self, program: Option<ProgramId>) -> Vec<&Course> {
        self.courses
            .iter()
            .filter(|course| course.kind == CourseKind::Elective)
            .filter(|course| program.map_or(true, |p| course.program == p))
            .collect()
    }

    /// Top `max` electives for the user, best first.
    pub fn recommend(
        &self,
        background: &str,
        interests: &[String],
        program: Option<ProgramId>,
        max: usize,
    ) -> Vec<Recommendation> {
        let skills = UserSkills::from_background(background);
        let mut ranked: Vec<Recommendation> = self
            .electives(program)
            .into_iter()
            .map(|course| score_course(course, &skills, interests))
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(max);
        for (idx, rec) in ranked.iter_mut().enumerate() {
            rec.priority = idx + 1;
        }
        ranked
    }
}

fn score_course(course: &Course, skills: &UserSkills, interests: &[String]) -> Recommendation {
    let mut reasons = Vec::new();
    let name = course.name.to_lowercase();
    let description = course.description.to_lowercase();

    let matched: Vec<&str> = interests
        .iter()
        .map(|interest| interest.trim())
        .filter(|interest| !interest.is_empty())
        .filter(|interest| {
            let needle = interest.to_lowercase();
            name.contains(&needle) || description.contains(&needle)
        })
        .collect();
    if !matched.is_empty() {
        reasons.push(format!("Соответствует интересам: {}", matched.join(", ")));
    }
    let interest = (0.4 * matched.len() as f32).min(0.4);

    let readiness = skills.readiness(&course.prerequisites);
    if readiness > 0.7 {
        reasons.push("Хорошая база для этого курса".to_string());
    } else if readiness < 0.3 {
        reasons.push("Может потребоваться дополнительная подготовка".to_string());
    }

    let growth = skills.growth(&course.skills);
    if growth > 0.7 {
        reasons.push("Поможет освоить новые востребованные навыки".to_string());
    }

    let career = career_value(course);
    if career > 0.7 {
        reasons.push("Высокая востребованность на рынке".to_string());
    }

    let reasoning = if reasons.is_empty() {
        "Общий выборный курс".to_string()
    } else {
        reasons.join("; ")
    };

    Recommendation {
        course: course.clone(),
        score: interest + 0.3 * readiness + 0.2 * growth + 0.1 * career,
        reasoning,
        priority: 0,
    }
}

/// Groups recommended courses by semester (1..=`semesters`).
pub fn study_plan(recommendations: &[Recommendation], semesters: u8) -> BTreeMap<u8, Vec<&Course>> {
    let mut plan: BTreeMap<u8, Vec<&Course>> = (1..=semesters).map(|s| (s, Vec::new())).collect();
    for rec in recommendations {
        if let Some(slot) = plan.get_mut(&rec.course.semester) {
            slot.push(&rec.course);
        }
    }
    plan
}

/// Renders recommendations as a chat message.
pub fn format_recommendations(recommendations: &[Recommendation], include_plan: bool) -> String {
    if recommendations.is_empty() {
        return "К сожалению, не удалось подобрать рекомендации. Попробуйте уточнить ваши интересы."
            .to_string();
    }

    let mut lines = vec!["🎯 Рекомендованные курсы:".to_string(), String::new()];
    for rec in recommendations {
        let marker = MEDALS
            .get(rec.priority.wrapping_sub(1))
            .copied()
            .unwrap_or("▪️");
        lines.push(format!("{marker} {}", rec.course.name));
        lines.push(format!("   📍 Программа: {}", rec.course.program.display_name()));
        lines.push(format!("   📅 Семестр: {}", rec.course.semester));
        lines.push(format!("   💡 {}", rec.reasoning));
        lines.push(format!("   📊 Оценка соответствия: {:.0}%", rec.score * 100.0));
        lines.push(String::new());
    }

    if include_plan {
        lines.push("📚 План изучения по семестрам:".to_string());
        lines.push(String::new());
        for (semester, courses) in study_plan(recommendations, PLAN_SEMESTERS) {
            if courses.is_empty() {
                continue;
            }
            lines.push(format!("Семестр {semester}:"));
            lines.extend(courses.iter().map(|course| format!("  • {}", course.name)));
            lines.push(String::new());
        }
    }

    lines.join("\n").trim_end().to_string()
}
