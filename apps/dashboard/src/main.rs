use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    CourseCountBucket, CourseService, Dashboard, DialogKind, DialogSlot, HttpCourseService,
    ImageUpload, Notification, NotificationLevel, SessionContext, SortField, TeacherFilter,
};
use futures::future::join_all;
use shared::{
    domain::{CourseId, Role, TeacherId, UserId},
    protocol::{UserInfoData, UserInfoRecord},
};
use storage::SessionStore;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dashboard", about = "Course dashboard client")]
struct Cli {
    /// Overrides `server_url` from settings.
    #[arg(long)]
    server_url: Option<String>,
    /// Overrides `session_database_url` from settings.
    #[arg(long)]
    session_db: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RoleArg {
    Admin,
    Teacher,
    Student,
}

impl From<RoleArg> for Role {
    fn from(value: RoleArg) -> Self {
        match value {
            RoleArg::Admin => Role::Admin,
            RoleArg::Teacher => Role::Teacher,
            RoleArg::Student => Role::Student,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Persists a signed-in identity for later commands.
    LoginAs {
        user_id: String,
        #[arg(long, value_enum, default_value = "teacher")]
        role: RoleArg,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        token: Option<String>,
    },
    Logout,
    Courses {
        /// Also load each course's modules.
        #[arg(long)]
        modules: bool,
    },
    AddCourse {
        title: String,
        category: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        image: Option<String>,
    },
    EditCourse {
        course: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    DeleteCourse {
        course: String,
    },
    AddModule {
        course: String,
        title: String,
        #[arg(long)]
        description: String,
        /// `YYYY-MM-DDTHH:MM`
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },
    AddStudent {
        course: String,
        name: String,
        email: String,
        #[arg(long)]
        phone: Option<String>,
    },
    Teachers {
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long, default_value = "all")]
        bucket: CourseCountBucket,
        #[arg(long, default_value = "none")]
        sort: SortField,
    },
    Teacher {
        teacher: String,
    },
    EditProfile {
        teacher: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        bio: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        rating: Option<String>,
    },
    UploadImage {
        teacher: String,
        path: PathBuf,
    },
    TeacherCourses {
        teacher: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut settings = client_core::load_settings()?;
    if let Some(server_url) = cli.server_url {
        settings.server_url = server_url;
    }
    if let Some(session_db) = cli.session_db {
        settings.session_database_url = session_db;
    }
    settings.validate()?;

    let sessions = SessionStore::new(&settings.session_database_url).await?;
    match cli.command {
        Command::LoginAs {
            user_id,
            role,
            name,
            token,
        } => {
            let record = UserInfoRecord {
                data: UserInfoData {
                    id: UserId::new(user_id),
                    role: role.into(),
                    name,
                    email: None,
                    token,
                },
            };
            sessions.save_user_info(&record).await?;
            println!("signed in as {}", record.data.id);
            return Ok(());
        }
        Command::Logout => {
            let cleared = sessions.clear_session().await?;
            println!("{}", if cleared { "signed out" } else { "no session" });
            return Ok(());
        }
        _ => {}
    }

    let session = SessionContext::from_store(&sessions).await;
    let service = HttpCourseService::new(&settings.server_url, settings.request_timeout())?
        .with_bearer_token(session.bearer_token().map(str::to_string));
    info!(server = %settings.server_url, "dashboard: connected");

    let service: Arc<dyn CourseService> = Arc::new(service);
    let dashboard = Dashboard::new(service, session, settings.search_debounce());
    let mut notifications = dashboard.subscribe();

    let result = run(&dashboard, cli.command).await;
    drain(&mut notifications);
    result
}

async fn run(dashboard: &Dashboard, command: Command) -> Result<()> {
    match command {
        Command::LoginAs { .. } | Command::Logout => {}
        Command::Courses { modules } => {
            let courses = dashboard.load_courses().await?;
            if modules {
                let loads = courses
                    .iter()
                    .map(|course| dashboard.load_course_modules(&course.id));
                for (course, loaded) in courses.iter().zip(join_all(loads).await) {
                    println!("{} {} [{}]", course.id, course.title, course.category);
                    for module in loaded? {
                        println!(
                            "  {} {} {} -> {}",
                            module.id, module.title, module.start_time, module.end_time
                        );
                    }
                }
            } else {
                for course in courses {
                    println!("{} {} [{}]", course.id, course.title, course.category);
                }
            }
        }
        Command::AddCourse {
            title,
            category,
            description,
            image,
        } => {
            let mut fields = vec![
                ("title", title),
                ("category", category),
                ("description", description),
            ];
            fields.extend(image.map(|image| ("image", image)));
            submit_dialog(dashboard, DialogSlot::CreateCourse, fields).await?;
        }
        Command::EditCourse {
            course,
            title,
            category,
            description,
        } => {
            // Prefill reads the store, so load before opening.
            dashboard.load_courses().await?;
            let fields = present_fields([
                ("title", title),
                ("category", category),
                ("description", description),
            ]);
            let slot = DialogSlot::EditCourse {
                course: CourseId::new(course),
            };
            submit_dialog(dashboard, slot, fields).await?;
        }
        Command::DeleteCourse { course } => {
            dashboard.delete_course(&CourseId::new(course)).await?;
        }
        Command::AddModule {
            course,
            title,
            description,
            start,
            end,
        } => {
            let slot = DialogSlot::AddModule {
                course: CourseId::new(course),
            };
            let fields = vec![
                ("title", title),
                ("description", description),
                ("startTime", start),
                ("endTime", end),
            ];
            submit_dialog(dashboard, slot, fields).await?;
        }
        Command::AddStudent {
            course,
            name,
            email,
            phone,
        } => {
            let slot = DialogSlot::AddStudent {
                course: CourseId::new(course),
            };
            let mut fields = vec![("name", name), ("email", email)];
            fields.extend(phone.map(|phone| ("phone", phone)));
            submit_dialog(dashboard, slot, fields).await?;
        }
        Command::Teachers {
            search,
            bucket,
            sort,
        } => {
            let filter = TeacherFilter {
                search,
                bucket,
                sort,
            };
            for teacher in dashboard.search_teachers(filter).await? {
                println!(
                    "{} {} ({}) courses={}",
                    teacher.id,
                    teacher.name,
                    teacher.slug,
                    teacher
                        .course_count
                        .map(|count| count.to_string())
                        .unwrap_or_else(|| "-".into())
                );
            }
        }
        Command::Teacher { teacher } => {
            let teacher = dashboard.load_teacher(&TeacherId::new(teacher)).await?;
            println!("{}", serde_json::to_string_pretty(&teacher)?);
        }
        Command::EditProfile {
            teacher,
            name,
            status,
            bio,
            location,
            rating,
        } => {
            let teacher = TeacherId::new(teacher);
            dashboard.load_teacher(&teacher).await?;
            let fields = present_fields([
                ("name", name),
                ("status", status),
                ("bio", bio),
                ("location", location),
                ("rating", rating),
            ]);
            submit_dialog(dashboard, DialogSlot::EditTeacherProfile { teacher }, fields).await?;
        }
        Command::UploadImage { teacher, path } => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".into());
            let upload = ImageUpload {
                mime_type: mime_for(&path).map(str::to_string),
                filename,
                bytes,
            };
            let teacher = dashboard
                .upload_teacher_image(&TeacherId::new(teacher), upload)
                .await?;
            println!("{}", teacher.image_url.unwrap_or_default());
        }
        Command::TeacherCourses { teacher } => {
            let teacher = TeacherId::new(teacher);
            dashboard
                .open_dialog(DialogSlot::TeacherCourses {
                    teacher: teacher.clone(),
                })
                .await?;
            for course in dashboard.teacher_courses(&teacher) {
                println!("{} {}", course.id, course.title);
            }
            dashboard.close_dialog(DialogKind::TeacherCourses);
        }
    }
    Ok(())
}

/// Drives a dialog the way the UI does: open, fill, submit.
async fn submit_dialog(
    dashboard: &Dashboard,
    slot: DialogSlot,
    fields: Vec<(&'static str, String)>,
) -> Result<()> {
    let kind = slot.kind();
    dashboard.open_dialog(slot).await?;
    for (field, value) in fields {
        dashboard.edit_draft(kind, field, value)?;
    }
    if let Err(err) = dashboard.submit(kind).await {
        dashboard.close_dialog(kind);
        return Err(err.into());
    }
    Ok(())
}

/// Keeps only the flags that were given; the rest stay as prefilled.
fn present_fields<const N: usize>(
    fields: [(&'static str, Option<String>); N],
) -> Vec<(&'static str, String)> {
    fields
        .into_iter()
        .filter_map(|(field, value)| value.map(|value| (field, value)))
        .collect()
}

fn mime_for(path: &std::path::Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

fn drain(notifications: &mut broadcast::Receiver<Notification>) {
    while let Ok(notification) = notifications.try_recv() {
        let tag = match notification.level {
            NotificationLevel::Success => "ok",
            NotificationLevel::Info => "info",
            NotificationLevel::Error => "error",
        };
        eprintln!("[{tag}] {}", notification.message);
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
