use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[zbus::proxy(
    interface = "org.freedesktop.Presence1",
    default_service = "org.freedesktop.Presence1",
    default_path = "/org/freedesktop/Presence1"
)]
trait Presence {
    async fn enroll(&self, draft: &str, face: &str, voice: &str) -> zbus::Result<String>;
    async fn update_templates(&self, id: &str, face: &str, voice: &str) -> zbus::Result<bool>;
    async fn verify(&self, sample: &str, check_in: bool) -> zbus::Result<String>;
    async fn admin_login(&self, face: &str) -> zbus::Result<String>;
    async fn list_persons(
        &self,
        department: &str,
        search: &str,
        include_inactive: bool,
    ) -> zbus::Result<String>;
    async fn person(&self, id: &str) -> zbus::Result<String>;
    async fn deactivate(&self, id: &str) -> zbus::Result<bool>;
    async fn overview(&self) -> zbus::Result<String>;
    async fn person_analytics(&self, id: &str) -> zbus::Result<String>;
    async fn today(&self) -> zbus::Result<String>;
    async fn history(&self, person_id: &str, start: &str, end: &str) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "presence", about = "Presence attendance-verification CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a new person (face embedding required)
    Enroll {
        /// Display name
        #[arg(short, long)]
        name: String,
        /// Employee id, unique among active persons
        #[arg(short, long)]
        employee_id: Option<String>,
        #[arg(short, long)]
        department: Option<String>,
        /// Date of birth, YYYY-MM-DD
        #[arg(long)]
        date_of_birth: Option<String>,
        #[arg(long)]
        gender: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        /// Grant admin-login rights
        #[arg(long)]
        admin: bool,
        /// Path to a JSON array with the face embedding
        #[arg(short, long)]
        face: PathBuf,
        /// Path to a JSON array with the voice embedding
        #[arg(short, long)]
        voice: Option<PathBuf>,
    },
    /// Replace an enrolled person's templates
    Reenroll {
        id: String,
        #[arg(short, long)]
        face: Option<PathBuf>,
        #[arg(short, long)]
        voice: Option<PathBuf>,
    },
    /// Verify a sample without touching attendance
    Verify {
        #[arg(short, long)]
        face: Option<PathBuf>,
        #[arg(short, long)]
        voice: Option<PathBuf>,
    },
    /// Verify a sample and record today's check-in
    Checkin {
        #[arg(short, long)]
        face: Option<PathBuf>,
        #[arg(short, long)]
        voice: Option<PathBuf>,
    },
    /// Authenticate as an admin (face only)
    Login {
        #[arg(short, long)]
        face: PathBuf,
    },
    /// List enrolled persons
    List {
        #[arg(short, long)]
        department: Option<String>,
        /// Substring match over name and employee id
        #[arg(short, long)]
        search: Option<String>,
        #[arg(long)]
        include_inactive: bool,
    },
    /// Show one person
    Person { id: String },
    /// Per-person attendance statistics and history
    Analytics { id: String },
    /// Today's dashboard overview
    Overview,
    /// Today's attendance rows
    Today,
    /// Attendance history (dates as YYYY-MM-DD)
    History {
        #[arg(short, long)]
        person_id: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// Deactivate a person (history is kept)
    Deactivate { id: String },
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let connection = zbus::Connection::session()
        .await
        .context("connecting to session bus (is presenced running?)")?;
    let proxy = PresenceProxy::new(&connection).await?;

    match cli.command {
        Commands::Enroll {
            name,
            employee_id,
            department,
            date_of_birth,
            gender,
            email,
            phone,
            admin,
            face,
            voice,
        } => {
            let draft = serde_json::json!({
                "name": name,
                "employee_id": employee_id,
                "department": department,
                "date_of_birth": date_of_birth,
                "gender": gender,
                "email": email,
                "phone": phone,
                "is_admin": admin,
            });
            let face = read_embedding(&face)?;
            let voice = voice.as_deref().map(read_embedding).transpose()?;
            let reply = proxy
                .enroll(&draft.to_string(), &face, voice.as_deref().unwrap_or(""))
                .await?;
            print_json(&reply);
        }
        Commands::Reenroll { id, face, voice } => {
            let face = face.as_deref().map(read_embedding).transpose()?;
            let voice = voice.as_deref().map(read_embedding).transpose()?;
            proxy
                .update_templates(
                    &id,
                    face.as_deref().unwrap_or(""),
                    voice.as_deref().unwrap_or(""),
                )
                .await?;
            println!("templates updated: {id}");
        }
        Commands::Verify { face, voice } => {
            let reply = proxy.verify(&sample_json(face, voice)?, false).await?;
            print_json(&reply);
        }
        Commands::Checkin { face, voice } => {
            let reply = proxy.verify(&sample_json(face, voice)?, true).await?;
            print_json(&reply);
        }
        Commands::Login { face } => {
            let reply = proxy.admin_login(&read_embedding(&face)?).await?;
            print_json(&reply);
        }
        Commands::List {
            department,
            search,
            include_inactive,
        } => {
            let reply = proxy
                .list_persons(
                    department.as_deref().unwrap_or(""),
                    search.as_deref().unwrap_or(""),
                    include_inactive,
                )
                .await?;
            print_json(&reply);
        }
        Commands::Person { id } => {
            print_json(&proxy.person(&id).await?);
        }
        Commands::Analytics { id } => {
            print_json(&proxy.person_analytics(&id).await?);
        }
        Commands::Overview => {
            print_json(&proxy.overview().await?);
        }
        Commands::Today => {
            print_json(&proxy.today().await?);
        }
        Commands::History {
            person_id,
            start,
            end,
        } => {
            let reply = proxy
                .history(
                    person_id.as_deref().unwrap_or(""),
                    start.as_deref().unwrap_or(""),
                    end.as_deref().unwrap_or(""),
                )
                .await?;
            print_json(&reply);
        }
        Commands::Deactivate { id } => {
            proxy.deactivate(&id).await?;
            println!("deactivated: {id}");
        }
        Commands::Status => {
            print_json(&proxy.status().await?);
        }
    }

    Ok(())
}

/// Read a JSON embedding array from disk, validating it parses.
fn read_embedding(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading embedding file {}", path.display()))?;
    let _: Vec<f32> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of numbers", path.display()))?;
    Ok(raw)
}

fn sample_json(face: Option<PathBuf>, voice: Option<PathBuf>) -> Result<String> {
    let face: Option<serde_json::Value> = face
        .as_deref()
        .map(read_embedding)
        .transpose()?
        .map(|raw| serde_json::from_str(&raw))
        .transpose()?;
    let voice: Option<serde_json::Value> = voice
        .as_deref()
        .map(read_embedding)
        .transpose()?
        .map(|raw| serde_json::from_str(&raw))
        .transpose()?;
    Ok(serde_json::json!({ "face": face, "voice": voice }).to_string())
}

/// Pretty-print a JSON reply; fall back to raw text if it isn't JSON.
fn print_json(raw: &str) {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value).unwrap_or_else(|_| raw.to_string())),
        Err(_) => println!("{raw}"),
    }
}
