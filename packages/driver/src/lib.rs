pub mod error;

use zw_core::submodule;

submodule!(actor);
submodule!(controller_commands);
submodule!(driver);
submodule!(message);
submodule!(node);
submodule!(notification);
submodule!(options);
submodule!(poll);
submodule!(send_queue);
submodule!(storage);
submodule!(transaction);
