use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use brie_trails::{
    abbreviate_url, parse_address, validate_url, AreaId, EntityRef, FolderId, JsonFileBackend,
    PageId, ParentContext, StoreConfig, Trail, TrailId, TrailKind, TrailStore, TrailUpdate,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::debug;

const CONFIG_FILE: &str = "config.json";

#[derive(Parser)]
#[command(
    name = "brie-cli",
    about = "Manage Brie browser trails from the command line",
    author,
    version
)]
struct Cli {
    /// 資料目錄；預設為目前目錄下的 `.brie`。 / Data directory (defaults to `.brie` in the current directory).
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        env = "BRIE_DATA_DIR",
        default_value = ".brie"
    )]
    data_dir: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 建立、移動與編輯路徑。 / Create, move and edit trails.
    #[command(subcommand)]
    Trail(TrailCommand),
    /// 管理路徑中的頁面。 / Manage pages inside a trail.
    #[command(subcommand)]
    Page(PageCommand),
    /// 管理區域。 / Manage areas.
    #[command(subcommand)]
    Area(GroupCommand),
    /// 管理資料夾。 / Manage folders.
    #[command(subcommand)]
    Folder(GroupCommand),
    /// 管理路徑筆記。 / Manage trail notes.
    #[command(subcommand)]
    Note(NoteCommand),
    /// 以樹狀結構列出所有資料。 / Print the whole hierarchy as a tree.
    List,
    /// 匯出頂層路徑為 Markdown。 / Export top-level trails as markdown.
    Export(ExportArgs),
    /// 從 Markdown 匯入路徑。 / Import trails from exported markdown.
    Import(ImportArgs),
    /// 一次刪除多個實體。 / Delete several entities in one save.
    Delete(DeleteArgs),
    /// 清除所有資料。 / Remove every entity.
    Clear,
}

#[derive(Subcommand)]
enum TrailCommand {
    /// 建立新路徑。 / Create a trail.
    New(TrailNewArgs),
    /// 在指定路徑下建立子路徑。 / Create a sub-trail under a trail.
    Sub(TrailChildArgs),
    /// 在指定路徑之後建立旁支路徑。 / Create a side-trail right after a trail.
    Side(TrailChildArgs),
    /// 重新命名路徑。 / Rename a trail.
    Rename(TrailRenameArgs),
    /// 設定或清除路徑圖示。 / Set or clear a trail icon.
    Icon(TrailIconArgs),
    /// 切換路徑的收合狀態。 / Toggle whether a trail is collapsed.
    Toggle(TrailIdArgs),
    /// 移動路徑至其他位置。 / Move a trail to another context.
    Move(TrailMoveArgs),
    /// 刪除路徑及其所有內容。 / Delete a trail with everything below it.
    Delete(TrailIdArgs),
}

#[derive(Args)]
struct ContextArgs {
    /// 上層路徑 ID。 / Parent trail id.
    #[arg(long, value_name = "TRAIL_ID", conflicts_with_all = ["area", "folder"])]
    parent: Option<TrailId>,
    /// 所屬區域 ID。 / Area id.
    #[arg(long, value_name = "AREA_ID", conflicts_with = "folder")]
    area: Option<AreaId>,
    /// 所屬資料夾 ID。 / Folder id.
    #[arg(long, value_name = "FOLDER_ID")]
    folder: Option<FolderId>,
}

impl ContextArgs {
    fn to_parent(&self) -> ParentContext {
        match (self.parent, self.area, self.folder) {
            (Some(trail), _, _) => ParentContext::Trail(trail),
            (None, Some(area), _) => ParentContext::Area(area),
            (None, None, Some(folder)) => ParentContext::Folder(folder),
            (None, None, None) => ParentContext::TopLevel,
        }
    }
}

#[derive(Args)]
struct TrailNewArgs {
    /// 路徑名稱；無效時依設定處理。 / Trail name; invalid names follow the configured policy.
    #[arg(long)]
    name: Option<String>,
    /// 路徑類型。 / Trail kind.
    #[arg(long, value_enum, default_value_t = KindChoice::Trail)]
    kind: KindChoice,
    #[command(flatten)]
    context: ContextArgs,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum KindChoice {
    Trail,
    #[value(name = "sub", aliases = ["subtrail", "sub-trail"])]
    SubTrail,
    #[value(name = "side", aliases = ["sidetrail", "side-trail"])]
    SideTrail,
}

impl From<KindChoice> for TrailKind {
    fn from(choice: KindChoice) -> Self {
        match choice {
            KindChoice::Trail => TrailKind::Trail,
            KindChoice::SubTrail => TrailKind::SubTrail,
            KindChoice::SideTrail => TrailKind::SideTrail,
        }
    }
}

#[derive(Args)]
struct TrailChildArgs {
    /// 參考的路徑 ID。 / Trail the new trail is placed relative to.
    #[arg(value_name = "TRAIL_ID")]
    trail: TrailId,
    /// 路徑名稱。 / Trail name.
    #[arg(long)]
    name: Option<String>,
}

#[derive(Args)]
struct TrailIdArgs {
    #[arg(value_name = "TRAIL_ID")]
    trail: TrailId,
}

#[derive(Args)]
struct TrailRenameArgs {
    #[arg(value_name = "TRAIL_ID")]
    trail: TrailId,
    /// 新名稱。 / New name.
    name: String,
}

#[derive(Args)]
struct TrailIconArgs {
    #[arg(value_name = "TRAIL_ID")]
    trail: TrailId,
    /// 圖示；空字串代表清除。 / Icon; an empty string clears it.
    icon: String,
}

#[derive(Args)]
struct TrailMoveArgs {
    #[arg(value_name = "TRAIL_ID")]
    trail: TrailId,
    #[command(flatten)]
    context: ContextArgs,
    /// 目的地的排序索引。 / Order index at the destination.
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    index: i32,
}

#[derive(Subcommand)]
enum PageCommand {
    /// 新增頁面至路徑。 / Append a page to a trail.
    Add(PageAddArgs),
    /// 設定使用中的頁面。 / Make a page the active one.
    Activate(PageIdArgs),
    /// 移動頁面至其他路徑。 / Move a page to another trail.
    Move(PageMoveArgs),
    /// 刪除頁面。 / Delete a page.
    Delete(PageIdArgs),
}

#[derive(Args)]
struct PageAddArgs {
    #[arg(value_name = "TRAIL_ID")]
    trail: TrailId,
    /// 網址或網域（例如 example.com）。 / URL or bare domain such as example.com.
    address: String,
    /// 頁面標題；預設為網址。 / Page title; defaults to the URL.
    #[arg(long)]
    title: Option<String>,
}

#[derive(Args)]
struct PageIdArgs {
    #[arg(value_name = "PAGE_ID")]
    page: PageId,
}

#[derive(Args)]
struct PageMoveArgs {
    #[arg(value_name = "PAGE_ID")]
    page: PageId,
    /// 目的地路徑 ID。 / Destination trail id.
    #[arg(value_name = "TRAIL_ID")]
    trail: TrailId,
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    index: i32,
}

#[derive(Subcommand)]
enum GroupCommand {
    /// 建立新項目。 / Create a new entry.
    New(GroupNewArgs),
}

#[derive(Args)]
struct GroupNewArgs {
    name: String,
    /// 圖示。 / Icon.
    #[arg(long)]
    icon: Option<String>,
}

#[derive(Subcommand)]
enum NoteCommand {
    /// 建立筆記路徑並附上筆記。 / Create a note trail together with its note.
    New(NoteNewArgs),
    /// 建立或取代路徑筆記。 / Create or replace a trail's note.
    Set(NoteSetArgs),
}

#[derive(Args)]
struct NoteNewArgs {
    /// 路徑名稱。 / Trail name.
    #[arg(long)]
    name: Option<String>,
    /// 筆記內容。 / Note content.
    #[arg(long, default_value = "")]
    content: String,
    #[command(flatten)]
    context: ContextArgs,
}

#[derive(Args)]
struct NoteSetArgs {
    #[arg(value_name = "TRAIL_ID")]
    trail: TrailId,
    content: String,
}

#[derive(Args)]
struct ExportArgs {
    /// 輸出檔案路徑；略過時輸出至標準輸出。 / Destination file; prints to stdout when omitted.
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct ImportArgs {
    /// Markdown 檔案路徑。 / Markdown file to import.
    #[arg(value_name = "FILE")]
    input: PathBuf,
}

#[derive(Args)]
struct DeleteArgs {
    /// 參照，例如 brie://page/<uuid>。 / References such as brie://page/<uuid>.
    #[arg(required = true, value_name = "REF")]
    references: Vec<EntityRef>,
}

type Store = TrailStore<JsonFileBackend>;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let Cli { data_dir, command } = Cli::parse();
    let data_dir = resolve_input_path(&data_dir)?;
    let mut store = open_store(&data_dir)?;
    match command {
        Commands::Trail(subcommand) => execute_trail_command(subcommand, &mut store),
        Commands::Page(subcommand) => execute_page_command(subcommand, &mut store),
        Commands::Area(GroupCommand::New(args)) => {
            let area = store
                .create_area(&args.name, args.icon.as_deref())
                .context("failed to create area")?;
            println!("{}", area.id);
            Ok(())
        }
        Commands::Folder(GroupCommand::New(args)) => {
            let folder = store
                .create_folder(&args.name, args.icon.as_deref())
                .context("failed to create folder")?;
            println!("{}", folder.id);
            Ok(())
        }
        Commands::Note(NoteCommand::New(args)) => {
            let (trail, _) = store
                .create_note_trail(
                    args.name.as_deref(),
                    Some(&args.content),
                    args.context.to_parent(),
                )
                .context("failed to create note trail")?;
            println!("{}", trail.id);
            Ok(())
        }
        Commands::Note(NoteCommand::Set(args)) => set_note(args, &mut store),
        Commands::List => {
            print_tree(&store);
            Ok(())
        }
        Commands::Export(args) => export_trails(args, &store),
        Commands::Import(args) => import_trails(args, &mut store),
        Commands::Delete(args) => {
            let removed = store
                .bulk_delete(&args.references)
                .context("failed to delete entities")?;
            println!("Deleted {removed} records");
            Ok(())
        }
        Commands::Clear => {
            store.clear_all().context("failed to clear trails")?;
            println!("Cleared all trails");
            Ok(())
        }
    }
}

fn open_store(data_dir: &Path) -> Result<Store> {
    let config_path = data_dir.join(CONFIG_FILE);
    let config = StoreConfig::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    debug!("opening trail store in {}", data_dir.display());
    TrailStore::open_in(data_dir, config)
        .with_context(|| format!("failed to open trail store in {}", data_dir.display()))
}

fn execute_trail_command(command: TrailCommand, store: &mut Store) -> Result<()> {
    match command {
        TrailCommand::New(args) => {
            let trail = store
                .create_trail(
                    args.name.as_deref(),
                    args.kind.into(),
                    args.context.to_parent(),
                )
                .context("failed to create trail")?;
            println!("{}", trail.id);
        }
        TrailCommand::Sub(args) => {
            let trail = store
                .create_sub_trail(args.trail, args.name.as_deref())
                .context("failed to create sub-trail")?;
            println!("{}", trail.id);
        }
        TrailCommand::Side(args) => {
            let trail = store
                .create_side_trail(args.trail, args.name.as_deref())
                .context("failed to create side-trail")?;
            println!("{}", trail.id);
        }
        TrailCommand::Rename(args) => {
            let update = TrailUpdate {
                name: Some(args.name),
                ..TrailUpdate::default()
            };
            let trail = store
                .update_trail(args.trail, update)
                .context("failed to rename trail")?;
            println!("Renamed trail to '{}'", trail.name);
        }
        TrailCommand::Icon(args) => {
            let update = TrailUpdate {
                icon: Some(args.icon),
                ..TrailUpdate::default()
            };
            store
                .update_trail(args.trail, update)
                .context("failed to update trail icon")?;
        }
        TrailCommand::Toggle(args) => {
            let collapsed = store
                .toggle_trail_collapsed(args.trail)
                .context("failed to toggle trail")?;
            println!("{}", if collapsed { "collapsed" } else { "expanded" });
        }
        TrailCommand::Move(args) => {
            store
                .move_trail(args.trail, args.context.to_parent(), args.index)
                .context("failed to move trail")?;
        }
        TrailCommand::Delete(args) => {
            let removed = store
                .delete_trail(args.trail)
                .context("failed to delete trail")?;
            println!("Deleted {removed} records");
        }
    }
    Ok(())
}

fn execute_page_command(command: PageCommand, store: &mut Store) -> Result<()> {
    match command {
        PageCommand::Add(args) => {
            let url = if validate_url(&args.address) {
                args.address.clone()
            } else {
                match parse_address(&args.address) {
                    Some(url) => url.to_string(),
                    None => bail!("'{}' is not a web address", args.address),
                }
            };
            let page = store
                .create_page(args.trail, &url, args.title.as_deref())
                .context("failed to add page")?;
            println!("{}", page.id);
        }
        PageCommand::Activate(args) => {
            store
                .set_active_page(Some(args.page))
                .context("failed to activate page")?;
        }
        PageCommand::Move(args) => {
            store
                .move_page(args.page, args.trail, args.index)
                .context("failed to move page")?;
        }
        PageCommand::Delete(args) => {
            store
                .delete_page(args.page)
                .context("failed to delete page")?;
        }
    }
    Ok(())
}

fn set_note(args: NoteSetArgs, store: &mut Store) -> Result<()> {
    let existing = store.note_for(args.trail).map(|note| note.id);
    let note = match existing {
        Some(id) => store.update_note(id, &args.content),
        None => store.create_note(args.trail, Some(&args.content)),
    }
    .context("failed to save note")?;
    println!("{}", note.id);
    Ok(())
}

fn export_trails(args: ExportArgs, store: &Store) -> Result<()> {
    match args.output {
        Some(output) => {
            let output = resolve_input_path(&output)?;
            store
                .backup_to(&output)
                .with_context(|| format!("failed to export trails to {}", output.display()))?;
            println!("Exported trails to {}", output.display());
        }
        None => print!("{}", store.export_trails_to_markdown()),
    }
    Ok(())
}

fn import_trails(args: ImportArgs, store: &mut Store) -> Result<()> {
    let input = resolve_input_path(&args.input)?;
    if !input.exists() {
        bail!("markdown file '{}' does not exist", input.display());
    }
    let text = fs::read_to_string(&input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let summary = store
        .import_markdown(&text)
        .with_context(|| format!("failed to import {}", input.display()))?;
    println!(
        "Imported {} trails and {} pages",
        summary.trails, summary.pages
    );
    Ok(())
}

fn print_tree(store: &Store) {
    if store.is_empty() {
        println!("No trails yet.");
        return;
    }
    for trail in store.trails() {
        print_trail(store, trail, 0);
    }
    for area in store.areas() {
        println!(
            "Area {}{} ({})",
            icon_prefix(area.icon.as_deref()),
            area.name,
            area.id
        );
        for trail in store.trails_in_area(area.id) {
            print_trail(store, trail, 1);
        }
    }
    for folder in store.folders() {
        println!(
            "Folder {}{} ({})",
            icon_prefix(folder.icon.as_deref()),
            folder.name,
            folder.id
        );
        for trail in store.trails_in_folder(folder.id) {
            print_trail(store, trail, 1);
        }
    }
}

fn print_trail(store: &Store, trail: &Trail, depth: usize) {
    let indent = "  ".repeat(depth);
    let marker = if trail.is_collapsed { "+" } else { "-" };
    println!(
        "{indent}{marker} {}{} ({})",
        icon_prefix(trail.icon.as_deref()),
        trail.name,
        trail.id
    );
    if let Some(note) = store.note_for(trail.id) {
        println!("{indent}    note: {}", note.content);
    }
    for page in store.pages_of(trail.id) {
        let location = page
            .parsed_url()
            .map(|url| abbreviate_url(&url))
            .unwrap_or_else(|| page.url.clone());
        let active = if page.is_active { " *" } else { "" };
        println!(
            "{indent}    {} <{location}> ({}){active}",
            page.title, page.id
        );
    }
    for child in store.child_trails(trail.id) {
        print_trail(store, child, depth + 1);
    }
}

fn icon_prefix(icon: Option<&str>) -> String {
    icon.map(|icon| format!("{icon} "))
        .unwrap_or_default()
}

fn resolve_input_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()
            .context("determine current directory")?
            .join(path))
    }
}
