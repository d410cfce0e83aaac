use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use course_manager::api::DEFAULT_QUESTIONS_PAGE;
use course_manager::config::ClientConfig;
use course_manager::error::AppError;
use course_manager::models::{
    CourseUpdateField, Credentials, EmailFrequency, FileSelection, NewCourseRequest,
    RegisterRequest,
};
use course_manager::navigation::{TracingNavigator, previous_questions_path};
use course_manager::session::SessionEvent;
use course_manager::state::AppState;
use course_manager::view::{ActionOutcome, CoursesPage};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "course-manager", about = "Manage courses on the course API")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Register {
        username: String,
        email: String,
        password: String,
    },
    Login {
        username: String,
        password: String,
    },
    Logout,
    Profile,
    /// List your courses
    Courses,
    Create {
        name: String,
        #[arg(long, default_value = "daily")]
        email_frequency: EmailFrequency,
        #[arg(long, default_value_t = 5)]
        num_questions: u8,
    },
    Update {
        course_id: String,
        #[arg(long)]
        email_frequency: Option<EmailFrequency>,
        #[arg(long)]
        num_questions: Option<u8>,
    },
    Delete {
        course_id: String,
    },
    Upload {
        course_id: String,
        path: PathBuf,
    },
    /// Search users by username or email
    Search {
        query: String,
    },
    AddMember {
        course_id: String,
        username: String,
    },
    PreviousQuestions {
        course_id: String,
        #[arg(long = "page", default_value_t = DEFAULT_QUESTIONS_PAGE)]
        page_number: u32,
    },
    Questions {
        course_id: String,
        #[arg(long)]
        user_id: Option<String>,
    },
    /// Submit answers read from a JSON file
    Submit {
        course_id: String,
        answers: PathBuf,
        #[arg(long)]
        user_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "course_manager=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = ClientConfig::new_from_env()?;
    let state = AppState::connect(config, Arc::new(TracingNavigator)).await?;

    let mut events = state.session.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if event == SessionEvent::Invalidated {
                warn!("Session is no longer valid, log in again");
            }
        }
    });

    let outcome = run(&state, args.command).await?;
    Ok(match outcome {
        ActionOutcome::Succeeded => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

async fn run(state: &AppState, command: Command) -> Result<ActionOutcome, AppError> {
    let api = &state.api;
    let page = state.courses_page();

    let outcome = match command {
        Command::Register {
            username,
            email,
            password,
        } => {
            let ack = api
                .register(&RegisterRequest {
                    username,
                    email,
                    password,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&ack)?);
            ActionOutcome::Succeeded
        }
        Command::Login { username, password } => {
            let data = api.login(&Credentials { username, password }).await?;
            println!("Logged in as {}", data.user_id);
            ActionOutcome::Succeeded
        }
        Command::Logout => {
            api.logout().await;
            println!("Logged out");
            ActionOutcome::Succeeded
        }
        Command::Profile => {
            let profile = api.get_profile().await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
            ActionOutcome::Succeeded
        }
        Command::Courses => {
            let outcome = page.mount().await;
            let courses = page.courses();
            if courses.is_empty() {
                println!("No courses available. Create one to get started!");
            }
            for course in courses {
                println!(
                    "{}  {}  email: {}  questions: {}  ({})",
                    course.id,
                    course.name,
                    course.email_frequency,
                    course.num_questions,
                    previous_questions_path(&course.id)
                );
            }
            outcome
        }
        Command::Create {
            name,
            email_frequency,
            num_questions,
        } => {
            page.open_create_modal();
            page.set_draft(NewCourseRequest {
                name,
                email_frequency,
                num_questions,
            });
            page.create_course().await
        }
        Command::Update {
            course_id,
            email_frequency,
            num_questions,
        } => {
            page.mount().await;
            if let Some(freq) = email_frequency {
                page.set_pending_update(&course_id, CourseUpdateField::EmailFrequency(freq));
            }
            if let Some(n) = num_questions {
                page.set_pending_update(&course_id, CourseUpdateField::NumQuestions(n));
            }
            page.update_course(&course_id).await
        }
        Command::Delete { course_id } => {
            page.mount().await;
            page.delete_course(&course_id).await
        }
        Command::Upload { course_id, path } => {
            let file = FileSelection::from_path(&path).await?;
            page.select_file(&course_id, file);
            page.upload_file(&course_id).await
        }
        Command::Search { query } => search(&page, &query).await,
        Command::AddMember {
            course_id,
            username,
        } => {
            page.open_add_member(&course_id);
            page.add_member(&username).await
        }
        Command::PreviousQuestions {
            course_id,
            page_number,
        } => {
            let data = api.get_previous_questions(&course_id, page_number).await?;
            println!("{}", serde_json::to_string_pretty(&data)?);
            ActionOutcome::Succeeded
        }
        Command::Questions { course_id, user_id } => {
            let user_id = resolve_user_id(state, user_id).await?;
            let data = api.get_personalized_questions(&course_id, &user_id).await?;
            println!("{}", serde_json::to_string_pretty(&data)?);
            ActionOutcome::Succeeded
        }
        Command::Submit {
            course_id,
            answers,
            user_id,
        } => {
            let user_id = resolve_user_id(state, user_id).await?;
            let raw = tokio::fs::read_to_string(&answers).await?;
            let answers: serde_json::Value = serde_json::from_str(&raw)?;
            let result = api.submit_answers(&course_id, &user_id, &answers).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            ActionOutcome::Succeeded
        }
    };

    for notification in page.take_notifications() {
        println!("{}", notification);
    }
    page.unmount();
    Ok(outcome)
}

async fn search(page: &CoursesPage, query: &str) -> ActionOutcome {
    let outcome = page.search_now(query).await;
    if outcome != ActionOutcome::Succeeded {
        return outcome;
    }

    let users = page.search_results();
    if users.is_empty() {
        println!("No users found");
    }
    for user in users {
        println!("{} ({})", user.username, user.email);
    }
    outcome
}

async fn resolve_user_id(state: &AppState, user_id: Option<String>) -> Result<String, AppError> {
    match user_id {
        Some(id) => Ok(id),
        None => state
            .session
            .user_id()
            .await?
            .ok_or_else(|| AppError::Validation("not logged in, pass --user-id".to_string())),
    }
}
