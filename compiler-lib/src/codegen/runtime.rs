//! Fixed support files shipped with every compiled project.
//!
//! C knows no bounds-carrying arrays, so `int[]` lowers to a heap struct
//! pairing the length with the data pointer. The build manifest globs the
//! whole output directory and compiles it as a single C99 executable.

pub const INT_ARRAY_H: &str = "\
#ifndef __INT_ARRAY_H
#define __INT_ARRAY_H

typedef struct {
    int length;
    int *data;
} __int_array;

__int_array *$_new___int_array(int size);

#endif //__INT_ARRAY_H
";

pub const INT_ARRAY_C: &str = "\
#include \"__int_array.h\"

#include <stdio.h>
#include <stdlib.h>

__int_array *$_new___int_array(int size) {
    __int_array *arr = (__int_array *) malloc(sizeof(__int_array));
    arr->length = size;
    arr->data = (int *) calloc(size, sizeof(int));
    return arr;
}
";

pub const CMAKE_LISTS: &str = "\
cmake_minimum_required(VERSION 3.23)

project(CompiledProject LANGUAGES C)

set(CMAKE_C_STANDARD 99)

file(GLOB_RECURSE SOURCES ${CMAKE_SOURCE_DIR}/*.c ${CMAKE_SOURCE_DIR}/*.h)
set(FILTERED_SOURCES)

foreach (SOURCE_FILE ${SOURCES})
    get_filename_component(FILENAME ${SOURCE_FILE} NAME)
    if (NOT SOURCE_FILE MATCHES \"CMakeFiles/\")
        list(APPEND FILTERED_SOURCES ${SOURCE_FILE})
    endif ()
endforeach ()

add_executable(${PROJECT_NAME} ${FILTERED_SOURCES})
";
