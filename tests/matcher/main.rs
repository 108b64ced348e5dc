mod lookup;
mod support;
mod visibility;
