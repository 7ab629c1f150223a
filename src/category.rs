//! # Categories
//! The four standardized grading buckets and a rule-ordered classifier that maps
//! raw assignment / group labels onto them.
//!
//! Rule order (first match wins, case-insensitive substring over name + group):
//! 1. exams        : exam, midterm, final, quiz, test
//! 2. projects     : project, capstone, lab (unless "small"/"recitation" → assignments)
//! 3. participation: participation, attendance, discussion, poll, peer
//! 4. assignments  : everything else

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Projects,
    Assignments,
    Exams,
    Participation,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Projects,
        Category::Assignments,
        Category::Exams,
        Category::Participation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Projects => "projects",
            Category::Assignments => "assignments",
            Category::Exams => "exams",
            Category::Participation => "participation",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const EXAM_KEYWORDS: &[&str] = &["exam", "midterm", "final", "quiz", "test"];
const PROJECT_KEYWORDS: &[&str] = &["project", "capstone", "lab"];
const LAB_DEMOTERS: &[&str] = &["small", "recitation"];
const PARTICIPATION_KEYWORDS: &[&str] = &["participation", "attendance", "discussion", "poll", "peer"];

/// Map an assignment name and its group name onto a category. Total and pure.
pub fn classify(assignment_name: &str, group_name: &str) -> Category {
    let hay = format!("{} {}", assignment_name, group_name).to_lowercase();
    let has_any = |words: &[&str]| words.iter().any(|w| hay.contains(w));

    if has_any(EXAM_KEYWORDS) {
        return Category::Exams;
    }
    if has_any(PROJECT_KEYWORDS) {
        if has_any(LAB_DEMOTERS) {
            return Category::Assignments;
        }
        return Category::Projects;
    }
    if has_any(PARTICIPATION_KEYWORDS) {
        return Category::Participation;
    }
    Category::Assignments
}

/// One value per category. Serializes as a flat object keyed by category name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryMap<T> {
    pub projects: T,
    pub assignments: T,
    pub exams: T,
    pub participation: T,
}

impl<T> CategoryMap<T> {
    pub fn get(&self, category: Category) -> &T {
        match category {
            Category::Projects => &self.projects,
            Category::Assignments => &self.assignments,
            Category::Exams => &self.exams,
            Category::Participation => &self.participation,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut T {
        match category {
            Category::Projects => &mut self.projects,
            Category::Assignments => &mut self.assignments,
            Category::Exams => &mut self.exams,
            Category::Participation => &mut self.participation,
        }
    }

    pub fn from_fn(mut f: impl FnMut(Category) -> T) -> Self {
        Self {
            projects: f(Category::Projects),
            assignments: f(Category::Assignments),
            exams: f(Category::Exams),
            participation: f(Category::Participation),
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(Category, &T) -> U) -> CategoryMap<U> {
        CategoryMap::from_fn(|c| f(c, self.get(c)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &T)> {
        Category::ALL.into_iter().map(move |c| (c, self.get(c)))
    }
}

/// Per-category percent for one course; `None` = no graded data in that category.
pub type CategoryPercent = CategoryMap<Option<f64>>;
