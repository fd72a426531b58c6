//! Backend project setup instructions, shown when configuration or tables
//! are missing.

/// Tables, row-level security and policies.
pub const SCHEMA_SQL: &str = r#"-- Messages
create table public.messages (
  id uuid default gen_random_uuid() primary key,
  text text,
  uid uuid not null,
  display_name text,
  photo_url text,
  media_url text,
  media_type text,
  media_size bigint,
  created_at timestamp with time zone default timezone('utc'::text, now()) not null
);

-- Profiles
create table public.users (
  id uuid references auth.users not null primary key,
  email text,
  display_name text,
  photo_url text,
  created_at timestamp with time zone default timezone('utc'::text, now()) not null
);

alter table public.messages enable row level security;
alter table public.users enable row level security;

create policy "Read messages" on public.messages for select to public using (true);
create policy "Insert own messages" on public.messages for insert to authenticated with check (uid = auth.uid());
create policy "Delete own messages" on public.messages for delete to authenticated using (uid = auth.uid());

create policy "Read profiles" on public.users for select to public using (true);
create policy "Update own profile" on public.users for update using (auth.uid() = id);
create policy "Insert own profile" on public.users for insert with check (auth.uid() = id);
"#;

/// Public media bucket.
pub const STORAGE_SQL: &str = r#"insert into storage.buckets (id, name, public)
values ('chat-media', 'chat-media', true);

create policy "Public media read" on storage.objects for select to public using (bucket_id = 'chat-media');
create policy "Media upload" on storage.objects for insert to public with check (bucket_id = 'chat-media');
"#;

const REALTIME_STEP: &str =
    "Database -> Publications -> supabase_realtime: enable the `messages` table.";

const CONFIG_STEP: &str = "Set KINFOLK_BACKEND_URL (Project URL) and KINFOLK_PUBLIC_KEY \
(anon public key) in the environment or in a .env file, then restart.";

/// Full step-by-step guide.
pub fn guide() -> String {
    format!(
        "1. Create a project and copy its URL and anon key.\n   {CONFIG_STEP}\n\n\
         2. In the SQL editor, create the tables:\n\n{SCHEMA_SQL}\n\
         3. Create the media bucket:\n\n{STORAGE_SQL}\n\
         4. Realtime: {REALTIME_STEP}\n\n\
         5. Auth: turn off \"Confirm email\" under Auth -> Providers -> Email for instant signups.\n"
    )
}

/// Short text for the configuration-missing screen.
pub fn configuration_help() -> &'static str {
    CONFIG_STEP
}
