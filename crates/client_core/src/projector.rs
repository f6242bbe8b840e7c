//! Teacher list filtering: one combined predicate, a stable sort, and
//! last-request-wins settlement of overlapping searches.

use std::{
    cmp::Ordering,
    fmt,
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use shared::{
    domain::{Teacher, TeacherId},
    protocol::TeacherQuery,
};
use thiserror::Error;
use tracing::debug;

use crate::{
    command::{Command, CommandOutcome, TeacherSearch},
    error::CoreError,
    gateway::CommandGateway,
};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {filter} '{value}'")]
pub struct ParseFilterError {
    filter: &'static str,
    value: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CourseCountBucket {
    #[default]
    All,
    /// No courses at all.
    Zero,
    /// One to three courses.
    Few,
    /// Four or more.
    Many,
}

impl CourseCountBucket {
    pub fn as_str(self) -> &'static str {
        match self {
            CourseCountBucket::All => "all",
            CourseCountBucket::Zero => "none",
            CourseCountBucket::Few => "few",
            CourseCountBucket::Many => "many",
        }
    }

    /// Teachers whose count is unknown are never filtered out.
    pub fn admits(self, course_count: Option<u32>) -> bool {
        let Some(count) = course_count else {
            return true;
        };
        match self {
            CourseCountBucket::All => true,
            CourseCountBucket::Zero => count == 0,
            CourseCountBucket::Few => (1..=3).contains(&count),
            CourseCountBucket::Many => count >= 4,
        }
    }
}

impl fmt::Display for CourseCountBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CourseCountBucket {
    type Err = ParseFilterError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "" | "all" => Ok(CourseCountBucket::All),
            "none" => Ok(CourseCountBucket::Zero),
            "few" => Ok(CourseCountBucket::Few),
            "many" => Ok(CourseCountBucket::Many),
            other => Err(ParseFilterError {
                filter: "course count bucket",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    /// Delivery order.
    #[default]
    Unsorted,
    CreatedAtAsc,
    CreatedAtDesc,
    NameAsc,
    RatingDesc,
}

impl SortField {
    pub fn as_str(self) -> &'static str {
        match self {
            SortField::Unsorted => "none",
            SortField::CreatedAtAsc => "createdAtAsc",
            SortField::CreatedAtDesc => "createdAtDesc",
            SortField::NameAsc => "nameAsc",
            SortField::RatingDesc => "ratingDesc",
        }
    }

    fn compare(self, a: &Teacher, b: &Teacher) -> Ordering {
        match self {
            SortField::Unsorted => Ordering::Equal,
            SortField::CreatedAtAsc => missing_last(a.created_at, b.created_at, |x, y| x.cmp(&y)),
            SortField::CreatedAtDesc => missing_last(a.created_at, b.created_at, |x, y| y.cmp(&x)),
            SortField::NameAsc => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortField::RatingDesc => missing_last(a.rating, b.rating, |x, y| y.cmp(&x)),
        }
    }
}

fn missing_last<T>(a: Option<T>, b: Option<T>, cmp: impl Fn(T, T) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => cmp(a, b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortField {
    type Err = ParseFilterError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "" | "none" => Ok(SortField::Unsorted),
            "createdAtAsc" => Ok(SortField::CreatedAtAsc),
            "createdAtDesc" => Ok(SortField::CreatedAtDesc),
            "nameAsc" => Ok(SortField::NameAsc),
            "ratingDesc" => Ok(SortField::RatingDesc),
            other => Err(ParseFilterError {
                filter: "sort field",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeacherFilter {
    pub search: String,
    pub bucket: CourseCountBucket,
    pub sort: SortField,
}

impl TeacherFilter {
    pub fn to_query(&self) -> TeacherQuery {
        TeacherQuery {
            search: self.search.trim().to_string(),
            course_count: self.bucket.as_str().to_string(),
            sort: self.sort.as_str().to_string(),
        }
    }

    /// Case-insensitive substring match over name, slug, location and subjects,
    /// combined with the course-count bucket.
    pub fn matches(&self, teacher: &Teacher) -> bool {
        if !self.bucket.admits(teacher.course_count) {
            return false;
        }
        let needle = self.search.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        let hit = |haystack: &str| haystack.to_lowercase().contains(&needle);
        hit(teacher.name.as_str())
            || hit(teacher.slug.as_str())
            || teacher.location.as_deref().is_some_and(hit)
            || teacher.subjects.iter().any(|subject| hit(subject.as_str()))
    }
}

/// Visible teacher ids for `filter`, stable with respect to delivery order.
pub fn project<'a>(
    filter: &TeacherFilter,
    teachers: impl IntoIterator<Item = &'a Teacher>,
) -> Vec<TeacherId> {
    let mut visible: Vec<&Teacher> = teachers
        .into_iter()
        .filter(|teacher| filter.matches(teacher))
        .collect();
    visible.sort_by(|a, b| filter.sort.compare(a, b));
    visible.into_iter().map(|teacher| teacher.id.clone()).collect()
}

/// A filter snapshot tagged with the order it was requested in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionRequest {
    pub stamp: u64,
    pub filter: TeacherFilter,
}

#[derive(Debug, Default)]
pub struct TeacherProjector {
    filter: TeacherFilter,
    latest: u64,
    visible: Vec<TeacherId>,
}

impl TeacherProjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(&self) -> &TeacherFilter {
        &self.filter
    }

    pub fn visible(&self) -> &[TeacherId] {
        &self.visible
    }

    pub fn is_current(&self, stamp: u64) -> bool {
        stamp == self.latest
    }

    pub fn set_search(&mut self, search: impl Into<String>) -> ProjectionRequest {
        self.filter.search = search.into();
        self.next_request()
    }

    pub fn set_bucket(&mut self, bucket: CourseCountBucket) -> ProjectionRequest {
        self.filter.bucket = bucket;
        self.next_request()
    }

    pub fn set_sort(&mut self, sort: SortField) -> ProjectionRequest {
        self.filter.sort = sort;
        self.next_request()
    }

    pub fn set_filter(&mut self, filter: TeacherFilter) -> ProjectionRequest {
        self.filter = filter;
        self.next_request()
    }

    fn next_request(&mut self) -> ProjectionRequest {
        self.latest += 1;
        ProjectionRequest {
            stamp: self.latest,
            filter: self.filter.clone(),
        }
    }

    /// Settles a response. Anything but the latest request is dropped.
    pub fn accept(&mut self, request: &ProjectionRequest, teachers: &[Teacher]) -> bool {
        if !self.is_current(request.stamp) {
            debug!(
                stamp = request.stamp,
                latest = self.latest,
                "projector: discarding stale result"
            );
            return false;
        }
        self.visible = project(&request.filter, teachers);
        true
    }

    /// Re-derives the visible list from records already held locally.
    pub fn reproject<'a>(&mut self, teachers: impl IntoIterator<Item = &'a Teacher>) {
        self.visible = project(&self.filter, teachers);
    }
}

/// Drives a [`TeacherProjector`] through the gateway.
pub struct TeacherDirectory {
    gateway: Arc<CommandGateway>,
    projector: Mutex<TeacherProjector>,
    debounce: Duration,
}

impl TeacherDirectory {
    pub fn new(gateway: Arc<CommandGateway>, debounce: Duration) -> Self {
        Self {
            gateway,
            projector: Mutex::new(TeacherProjector::new()),
            debounce,
        }
    }

    fn projector(&self) -> MutexGuard<'_, TeacherProjector> {
        self.projector.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn filter(&self) -> TeacherFilter {
        self.projector().filter().clone()
    }

    pub fn visible(&self) -> Vec<TeacherId> {
        self.projector().visible().to_vec()
    }

    /// Visible teachers resolved against the store, in display order.
    pub fn visible_teachers(&self) -> Vec<Teacher> {
        let ids = self.visible();
        self.gateway.read(|store| {
            ids.iter()
                .filter_map(|id| store.teachers.get(id).cloned())
                .collect()
        })
    }

    /// Each setter returns whether its own result became the visible list.
    pub async fn set_search(&self, search: impl Into<String>) -> Result<bool, CoreError> {
        let request = self.projector().set_search(search);
        self.refresh(request).await
    }

    pub async fn set_bucket(&self, bucket: CourseCountBucket) -> Result<bool, CoreError> {
        let request = self.projector().set_bucket(bucket);
        self.refresh(request).await
    }

    pub async fn set_sort(&self, sort: SortField) -> Result<bool, CoreError> {
        let request = self.projector().set_sort(sort);
        self.refresh(request).await
    }

    pub async fn set_filter(&self, filter: TeacherFilter) -> Result<bool, CoreError> {
        let request = self.projector().set_filter(filter);
        self.refresh(request).await
    }

    pub fn reproject_from_store(&self) {
        let teachers: Vec<Teacher> = self
            .gateway
            .read(|store| store.teachers.list().into_iter().cloned().collect());
        self.projector().reproject(&teachers);
    }

    async fn refresh(&self, request: ProjectionRequest) -> Result<bool, CoreError> {
        if !self.debounce.is_zero() {
            tokio::time::sleep(self.debounce).await;
            if !self.projector().is_current(request.stamp) {
                debug!(stamp = request.stamp, "projector: superseded before dispatch");
                return Ok(false);
            }
        }

        let command = Command::FetchTeachers(TeacherSearch {
            query: request.filter.to_query(),
            request: request.stamp,
        });
        let teachers = match self.gateway.dispatch(command).await {
            Ok(CommandOutcome::Teachers(teachers)) => teachers,
            Ok(_) => return Ok(false),
            Err(_) if !self.projector().is_current(request.stamp) => {
                debug!(stamp = request.stamp, "projector: ignoring failure of stale search");
                return Ok(false);
            }
            Err(err) => return Err(err),
        };
        Ok(self.projector().accept(&request, &teachers))
    }
}

#[cfg(test)]
#[path = "tests/projector_tests.rs"]
mod tests;
