pub struct Prompt {
    user: String,
}

impl Prompt {
    pub fn new() -> Self {
        Self {
            user: whoami::username(),
        }
    }

    pub fn get_string(&self) -> String {
        format!("[{}@minshell]$ ", self.user)
    }
}
