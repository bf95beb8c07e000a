use super::task::BoxedTask;

/// Named group of tasks executed one after another.
pub struct Stage<Ctx> {
    pub name: &'static str,
    pub tasks: Vec<BoxedTask<Ctx>>,
}

impl<Ctx> Stage<Ctx> {
    pub fn new(name: &'static str, tasks: Vec<BoxedTask<Ctx>>) -> Self {
        Self { name, tasks }
    }
}
